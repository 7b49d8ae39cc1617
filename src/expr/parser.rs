//! Recursive-descent parser producing a compact evaluation tree.

use super::lexer::{Token, TokenKind, syntax_error, tokenize};
use crate::cdr_error::CdrError;
use hashbrown::HashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Ln,
    Log10,
    Log2,
    Sqrt,
    Abs,
    Sign,
    Floor,
    Ceil,
    Round,
    Atan2,
    Pow,
    Min,
    Max,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "sin" => Function::Sin,
            "cos" => Function::Cos,
            "tan" => Function::Tan,
            "asin" => Function::Asin,
            "acos" => Function::Acos,
            "atan" => Function::Atan,
            "sinh" => Function::Sinh,
            "cosh" => Function::Cosh,
            "tanh" => Function::Tanh,
            "exp" => Function::Exp,
            "log" | "ln" => Function::Ln,
            "log10" => Function::Log10,
            "log2" => Function::Log2,
            "sqrt" => Function::Sqrt,
            "abs" => Function::Abs,
            "sign" => Function::Sign,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "atan2" => Function::Atan2,
            "pow" => Function::Pow,
            "min" => Function::Min,
            "max" => Function::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Function::Atan2 | Function::Pow | Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn apply(self, args: &[f64]) -> f64 {
        let a = args[0];
        match self {
            Function::Sin => a.sin(),
            Function::Cos => a.cos(),
            Function::Tan => a.tan(),
            Function::Asin => a.asin(),
            Function::Acos => a.acos(),
            Function::Atan => a.atan(),
            Function::Sinh => a.sinh(),
            Function::Cosh => a.cosh(),
            Function::Tanh => a.tanh(),
            Function::Exp => a.exp(),
            Function::Ln => a.ln(),
            Function::Log10 => a.log10(),
            Function::Log2 => a.log2(),
            Function::Sqrt => a.sqrt(),
            Function::Abs => a.abs(),
            Function::Sign => {
                if a > 0.0 {
                    1.0
                } else if a < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            }
            Function::Floor => a.floor(),
            Function::Ceil => a.ceil(),
            Function::Round => a.round(),
            Function::Atan2 => a.atan2(args[1]),
            Function::Pow => a.powf(args[1]),
            Function::Min => a.min(args[1]),
            Function::Max => a.max(args[1]),
        }
    }
}

/// Parsed expression; variables are resolved to slot indices.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Var(usize),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Evaluate with `vars[i]` bound to variable slot `i`.
    pub fn eval(&self, vars: &[f64]) -> f64 {
        match self {
            Expr::Number(v) => *v,
            Expr::Var(i) => vars[*i],
            Expr::Neg(e) => -e.eval(vars),
            Expr::Binary(op, l, r) => {
                let a = l.eval(vars);
                let b = r.eval(vars);
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => pow(a, b),
                }
            }
            Expr::Call(f, args) => {
                let mut values = [0.0; 2];
                for (slot, arg) in values.iter_mut().zip(args) {
                    *slot = arg.eval(vars);
                }
                f.apply(&values[..args.len()])
            }
        }
    }

    fn is_constant(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            _ => None,
        }
    }
}

fn pow(a: f64, b: f64) -> f64 {
    if b.fract() == 0.0 && b.abs() <= i32::MAX as f64 {
        a.powi(b as i32)
    } else {
        a.powf(b)
    }
}

/// Names a parser may resolve.
pub struct Symbols<'a> {
    pub variables: &'a [String],
    pub constants: &'a HashMap<String, f64>,
}

/// Parse a single expression.
pub fn parse(source: &str, symbols: &Symbols<'_>) -> Result<Expr, CdrError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        symbols,
    };
    let expr = parser.expression()?;
    let tok = parser.peek();
    if tok.kind != TokenKind::End {
        return Err(syntax_error(source, tok.offset, "unexpected trailing input"));
    }
    Ok(expr)
}

/// Split a component list on commas that are not inside parentheses.
pub fn split_components(source: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, c) in source.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&source[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&source[start..]);
    parts
}

struct Parser<'s, 'y> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    symbols: &'y Symbols<'y>,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if tok.kind != TokenKind::End {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<(), CdrError> {
        let tok = self.bump();
        if tok.kind == kind {
            Ok(())
        } else {
            Err(syntax_error(self.source, tok.offset, format!("expected {what}")))
        }
    }

    fn expression(&mut self) -> Result<Expr, CdrError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.term()?;
            lhs = fold(op, lhs, rhs);
        }
    }

    fn term(&mut self) -> Result<Expr, CdrError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = fold(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, CdrError> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.bump();
                let inner = self.unary()?;
                Ok(match inner.is_constant() {
                    Some(v) => Expr::Number(-v),
                    None => Expr::Neg(Box::new(inner)),
                })
            }
            TokenKind::Plus => {
                self.bump();
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, CdrError> {
        let base = self.primary()?;
        if self.peek().kind == TokenKind::Caret {
            self.bump();
            let exponent = self.unary()?;
            return Ok(fold(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, CdrError> {
        let tok = self.bump();
        match tok.kind {
            TokenKind::Number(v) => Ok(Expr::Number(v)),
            TokenKind::LParen => {
                let inner = self.expression()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => {
                if self.peek().kind == TokenKind::LParen {
                    return self.call(&name, tok.offset);
                }
                if let Some(slot) = self.symbols.variables.iter().position(|v| *v == name) {
                    return Ok(Expr::Var(slot));
                }
                if let Some(value) = self.symbols.constants.get(&name) {
                    return Ok(Expr::Number(*value));
                }
                Err(syntax_error(
                    self.source,
                    tok.offset,
                    format!("unknown symbol `{name}`"),
                ))
            }
            TokenKind::End => Err(syntax_error(
                self.source,
                tok.offset,
                "unexpected end of expression",
            )),
            other => Err(syntax_error(
                self.source,
                tok.offset,
                format!("unexpected token {other:?}"),
            )),
        }
    }

    fn call(&mut self, name: &str, offset: usize) -> Result<Expr, CdrError> {
        let function = Function::lookup(name).ok_or_else(|| {
            syntax_error(self.source, offset, format!("unknown function `{name}`"))
        })?;
        self.expect(TokenKind::LParen, "`(`")?;
        let mut args = vec![self.expression()?];
        while self.peek().kind == TokenKind::Comma {
            self.bump();
            args.push(self.expression()?);
        }
        self.expect(TokenKind::RParen, "`)`")?;
        if args.len() != function.arity() {
            return Err(syntax_error(
                self.source,
                offset,
                format!(
                    "`{name}` takes {} argument(s), got {}",
                    function.arity(),
                    args.len()
                ),
            ));
        }
        if args.iter().all(|a| a.is_constant().is_some()) {
            let values: Vec<f64> = args.iter().filter_map(Expr::is_constant).collect();
            return Ok(Expr::Number(function.apply(&values)));
        }
        Ok(Expr::Call(function, args))
    }
}

fn fold(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    match (lhs.is_constant(), rhs.is_constant()) {
        (Some(_), Some(_)) => Expr::Number(Expr::Binary(op, Box::new(lhs), Box::new(rhs)).eval(&[])),
        _ => Expr::Binary(op, Box::new(lhs), Box::new(rhs)),
    }
}
