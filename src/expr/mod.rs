//! Expression evaluator for coefficient fields.
//!
//! A [`FunctionParser`] compiles one or more symbolic expressions over declared
//! variables (`"x,y"` or `"x,y,t"`) into evaluation trees once, then evaluates
//! them at points. Time dependent parsers keep their own clock, which only
//! [`FunctionParser::set_time`] and [`FunctionParser::advance_time`] touch.

pub mod lexer;
pub mod parser;

use crate::cdr_error::CdrError;
use once_cell::sync::Lazy;
use parser::{Expr, Symbols, parse, split_components};

/// Most space variables a parser accepts (`x, y, z`).
pub const MAX_SPACE_VARIABLES: usize = 3;
use hashbrown::HashMap;

static DEFAULT_CONSTANTS: Lazy<HashMap<String, f64>> = Lazy::new(|| {
    let mut constants = HashMap::new();
    constants.insert("pi".to_string(), std::f64::consts::PI);
    constants.insert("e".to_string(), std::f64::consts::E);
    constants
});

/// The constant table every parser starts from (`pi`, `e`).
pub fn default_constants() -> HashMap<String, f64> {
    DEFAULT_CONSTANTS.clone()
}

/// Vector valued function of space (and optionally time) given by expressions.
#[derive(Clone, Debug)]
pub struct FunctionParser {
    sources: Vec<String>,
    components: Vec<Expr>,
    n_space: usize,
    time_dependent: bool,
    time: f64,
}

impl FunctionParser {
    /// Compile `expressions` over the comma separated `variables`.
    ///
    /// For a time dependent parser the last declared variable is time.
    pub fn new<S: AsRef<str>>(
        variables: &str,
        expressions: &[S],
        constants: &HashMap<String, f64>,
        time_dependent: bool,
    ) -> Result<Self, CdrError> {
        let names: Vec<String> = variables
            .split(',')
            .map(|v| v.trim().to_string())
            .collect();
        if names.iter().any(|n| n.is_empty()) {
            return Err(CdrError::Expression {
                expression: variables.to_string(),
                position: 0,
                message: "empty variable name".to_string(),
            });
        }
        let n_space = if time_dependent {
            names.len().checked_sub(1).filter(|&n| n > 0).ok_or_else(|| {
                CdrError::Expression {
                    expression: variables.to_string(),
                    position: 0,
                    message: "a time dependent function needs space variables and `t`"
                        .to_string(),
                }
            })?
        } else {
            names.len()
        };
        if n_space > MAX_SPACE_VARIABLES {
            return Err(CdrError::Expression {
                expression: variables.to_string(),
                position: 0,
                message: format!(
                    "{n_space} space variables declared, at most {MAX_SPACE_VARIABLES} supported"
                ),
            });
        }
        let symbols = Symbols {
            variables: &names,
            constants,
        };
        let components = expressions
            .iter()
            .map(|src| parse(src.as_ref(), &symbols))
            .collect::<Result<Vec<_>, _>>()?;
        if components.is_empty() {
            return Err(CdrError::Expression {
                expression: String::new(),
                position: 0,
                message: "no expressions given".to_string(),
            });
        }
        Ok(Self {
            sources: expressions.iter().map(|s| s.as_ref().to_string()).collect(),
            components,
            n_space,
            time_dependent,
            time: 0.0,
        })
    }

    /// Compile a comma separated component list, e.g. `"-y,x"`.
    pub fn from_component_list(
        variables: &str,
        list: &str,
        expected_components: usize,
        constants: &HashMap<String, f64>,
        time_dependent: bool,
    ) -> Result<Self, CdrError> {
        let parts = split_components(list);
        if parts.len() != expected_components {
            return Err(CdrError::Expression {
                expression: list.to_string(),
                position: 0,
                message: format!(
                    "expected {expected_components} components, found {}",
                    parts.len()
                ),
            });
        }
        Self::new(variables, &parts, constants, time_dependent)
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn is_time_dependent(&self) -> bool {
        self.time_dependent
    }

    /// Source text of each component.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    /// Move the internal clock forward; the compiled trees are untouched.
    pub fn advance_time(&mut self, delta: f64) {
        self.time += delta;
    }

    /// Evaluate one component at `point`, which must have one coordinate per
    /// space variable.
    pub fn value(&self, point: &[f64], component: usize) -> Result<f64, CdrError> {
        let expr = self.components.get(component).ok_or_else(|| {
            self.evaluation_error(format!(
                "component {component} requested, {} available",
                self.components.len()
            ))
        })?;
        let mut vars = [0.0; MAX_SPACE_VARIABLES + 1];
        let n = self.bind(point, &mut vars)?;
        Ok(expr.eval(&vars[..n]))
    }

    /// Evaluate all components at `point` into `out`.
    pub fn vector_value(&self, point: &[f64], out: &mut [f64]) -> Result<(), CdrError> {
        if out.len() != self.components.len() {
            return Err(self.evaluation_error(format!(
                "{} output slots for {} components",
                out.len(),
                self.components.len()
            )));
        }
        let mut vars = [0.0; MAX_SPACE_VARIABLES + 1];
        let n = self.bind(point, &mut vars)?;
        for (slot, expr) in out.iter_mut().zip(&self.components) {
            *slot = expr.eval(&vars[..n]);
        }
        Ok(())
    }

    fn evaluation_error(&self, message: String) -> CdrError {
        CdrError::Expression {
            expression: self.sources.join(","),
            position: 0,
            message,
        }
    }

    fn bind(&self, point: &[f64], vars: &mut [f64; MAX_SPACE_VARIABLES + 1]) -> Result<usize, CdrError> {
        let n = self.n_space;
        if point.len() != n {
            return Err(self.evaluation_error(format!(
                "evaluated at a point with {} coordinates, expected {n}",
                point.len()
            )));
        }
        vars[..n].copy_from_slice(point);
        if self.time_dependent {
            vars[n] = self.time;
            Ok(n + 1)
        } else {
            Ok(n)
        }
    }
}
