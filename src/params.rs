//! Run configuration for the shell CDR problem.
//!
//! [`Parameters`] is an immutable record handed to
//! [`CdrProblem::new`](crate::solver::CdrProblem::new). The defaults reproduce
//! the reference run: a shell between radii 1 and 2, rotating convection
//! `(-y, x)`, a Gaussian-like forcing bump decaying in time, `Q2` elements on a
//! three-times refined mesh, and 200 steps over `[0, 2]`.

use crate::cdr_error::CdrError;
use crate::topology::shell::MAX_LEVEL;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Highest supported polynomial order of the Lagrange elements.
pub const MAX_FE_ORDER: usize = 4;

/// Preconditioner selection for the Krylov solve.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreconditionerKind {
    Identity,
    Jacobi,
    /// ILU(0) of each rank's owned diagonal block.
    Ilu0,
}

/// Krylov solver controls.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// GMRES restart length.
    pub restart: usize,
    /// Stopping tolerance as a fraction of the right-hand-side norm.
    pub relative_tolerance: f64,
    /// Optional iteration cap; the effective cap never exceeds the DoF count.
    pub max_iterations: Option<usize>,
    pub preconditioner: PreconditionerKind,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            restart: 30,
            relative_tolerance: 1e-6,
            max_iterations: None,
            preconditioner: PreconditionerKind::Ilu0,
        }
    }
}

/// Where checkpoints go.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    /// File stem; fragments are `<basename>-<k>.<rank>.vtu`.
    pub basename: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            basename: "solution".to_string(),
        }
    }
}

/// Immutable run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub diffusion_coefficient: f64,
    /// Convection field as comma separated components in `x, y`.
    pub convection_field: String,
    pub reaction_coefficient: f64,
    /// Forcing term in `x, y, t`.
    pub forcing: String,
    /// When false the forcing is frozen at `start_time`.
    pub time_dependent_forcing: bool,
    pub refinement_level: u32,
    pub fe_order: usize,
    pub start_time: f64,
    pub stop_time: f64,
    pub n_time_steps: usize,
    pub save_interval: usize,
    /// Output subdivisions per cell.
    pub patch_level: usize,
    pub dimension: usize,
    /// Number of angular sectors of the coarse mesh.
    pub coarse_cells: usize,
    /// Give the inner circle boundary id 0 and the outer circle id 1.
    pub colorize_boundaries: bool,
    /// Boundary id receiving the homogeneous Dirichlet condition.
    pub dirichlet_boundary: u8,
    pub solver: SolverSettings,
    pub output: OutputSettings,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            inner_radius: 1.0,
            outer_radius: 2.0,
            diffusion_coefficient: 1.0e-3,
            convection_field: "-y,x".to_string(),
            reaction_coefficient: 1.0e-4,
            forcing: "exp(-2*t)*exp(-40*(x - 1.5)^6)*exp(-40*y^6)".to_string(),
            time_dependent_forcing: true,
            refinement_level: 3,
            fe_order: 2,
            start_time: 0.0,
            stop_time: 2.0,
            n_time_steps: 200,
            save_interval: 1,
            patch_level: 3,
            dimension: 2,
            coarse_cells: 8,
            colorize_boundaries: false,
            dirichlet_boundary: 0,
            solver: SolverSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> CdrError {
    CdrError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

impl Parameters {
    /// Fixed step size of the implicit scheme.
    pub fn time_step(&self) -> f64 {
        (self.stop_time - self.start_time) / self.n_time_steps as f64
    }

    /// Gauss points per direction, sized for the element order.
    pub fn quadrature_points(&self) -> usize {
        3 * (2 + self.fe_order) / 2
    }

    /// Whether step `k` (0-based) writes a checkpoint.
    pub fn is_checkpoint(&self, step: usize) -> bool {
        step % self.save_interval == 0
    }

    /// Reject configurations that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), CdrError> {
        if self.dimension != 2 {
            return Err(CdrError::UnsupportedDimension(self.dimension));
        }
        if !(self.inner_radius > 0.0) {
            return Err(invalid("inner_radius", "must be positive"));
        }
        if !(self.outer_radius > self.inner_radius) {
            return Err(invalid(
                "outer_radius",
                format!(
                    "{} must exceed inner radius {}",
                    self.outer_radius, self.inner_radius
                ),
            ));
        }
        if !(self.stop_time > self.start_time) {
            return Err(invalid(
                "stop_time",
                format!(
                    "time range [{}, {}] is empty",
                    self.start_time, self.stop_time
                ),
            ));
        }
        if self.n_time_steps == 0 {
            return Err(invalid("n_time_steps", "must be positive"));
        }
        if self.save_interval == 0 {
            return Err(invalid("save_interval", "must be positive"));
        }
        if self.fe_order == 0 || self.fe_order > MAX_FE_ORDER {
            return Err(invalid(
                "fe_order",
                format!("{} not in 1..={MAX_FE_ORDER}", self.fe_order),
            ));
        }
        if !(self.diffusion_coefficient >= 0.0) {
            return Err(invalid("diffusion_coefficient", "must be non-negative"));
        }
        if !self.reaction_coefficient.is_finite() {
            return Err(invalid("reaction_coefficient", "must be finite"));
        }
        if self.coarse_cells < 3 {
            return Err(invalid("coarse_cells", "a shell needs at least 3 sectors"));
        }
        if self.refinement_level > MAX_LEVEL {
            return Err(invalid(
                "refinement_level",
                format!("{} exceeds {MAX_LEVEL}", self.refinement_level),
            ));
        }
        if self.dirichlet_boundary > 1 {
            return Err(invalid("dirichlet_boundary", "shell boundary ids are 0 and 1"));
        }
        if self.solver.restart == 0 {
            return Err(invalid("solver.restart", "must be positive"));
        }
        let tol = self.solver.relative_tolerance;
        if !(tol > 0.0 && tol < 1.0) {
            return Err(invalid("solver.relative_tolerance", "must lie in (0, 1)"));
        }
        if self.solver.max_iterations == Some(0) {
            return Err(invalid("solver.max_iterations", "must be positive"));
        }
        if self.output.basename.is_empty() {
            return Err(invalid("output.basename", "must not be empty"));
        }
        if self.patch_level == 0 {
            log::warn!("patch_level 0 requested; writing one patch per cell");
        }
        Ok(())
    }
}
