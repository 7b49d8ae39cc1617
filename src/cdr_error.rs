//! CdrError: Unified error type for shell-cdr public APIs
//!
//! Every fallible operation in the crate returns `Result<_, CdrError>`. The
//! variants fall into the three fatal classes of a simulation run
//! (configuration, convergence, I/O) plus a handful of plumbing errors that
//! indicate misuse of an API or a broken collective exchange.

use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for shell-cdr operations.
#[derive(Debug, Error)]
pub enum CdrError {
    /// A symbolic expression could not be parsed.
    #[error("malformed expression `{expression}` at byte {position}: {message}")]
    Expression {
        expression: String,
        position: usize,
        message: String,
    },
    /// A parameter is outside its admissible range.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    /// Only two-dimensional shells are implemented.
    #[error("unsupported spatial dimension {0} (only 2 is implemented)")]
    UnsupportedDimension(usize),
    /// Mesh construction or refinement failed.
    #[error("mesh error: {0}")]
    Mesh(String),
    /// Constraint lines depend on each other in a cycle.
    #[error("constraint cycle detected through DoF {0}")]
    ConstraintCycle(usize),
    /// Incomplete factorization met a zero pivot.
    #[error("zero pivot in row {row} while building the preconditioner")]
    ZeroPivot { row: usize },
    /// A constraint set was used before `close()`.
    #[error("constraint set must be closed before it is applied")]
    ConstraintsNotClosed,
    /// A global index was looked up in a set that does not contain it.
    #[error("index {index} is not part of the {set} index set")]
    IndexNotInSet { index: usize, set: &'static str },
    /// The Krylov solve hit its iteration cap.
    #[error(
        "GMRES did not converge{}: residual {residual:e} > tolerance {tolerance:e} after {iterations} iterations",
        .step.map(|s| format!(" at time step {s}")).unwrap_or_default()
    )]
    SolverNotConverged {
        step: Option<usize>,
        iterations: usize,
        residual: f64,
        tolerance: f64,
    },
    /// An operation was requested in the wrong lifecycle state.
    #[error("operation requires state {expected}, but the problem is {found}")]
    InvalidState {
        expected: &'static str,
        found: String,
    },
    /// A collective payload had an unexpected layout.
    #[error("wire decode error: {0}")]
    Wire(String),
    /// Another rank reported a failure during a collective phase.
    #[error("rank {rank} failed during `{phase}`")]
    RemoteFailure { rank: usize, phase: &'static str },
    /// Filesystem error while writing output.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CdrError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CdrError::Io {
            path: path.into(),
            source,
        }
    }

    /// Errors detected while validating or setting up a run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CdrError::Expression { .. }
                | CdrError::InvalidParameter { .. }
                | CdrError::UnsupportedDimension(_)
                | CdrError::Mesh(_)
                | CdrError::ConstraintCycle(_)
                | CdrError::ZeroPivot { .. }
        )
    }

    /// Krylov non-convergence.
    pub fn is_convergence(&self) -> bool {
        matches!(self, CdrError::SolverNotConverged { .. })
    }

    /// Output failures.
    pub fn is_io(&self) -> bool {
        matches!(self, CdrError::Io { .. })
    }
}
