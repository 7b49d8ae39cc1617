//! Lifecycle states and per-step records of a [`CdrProblem`](super::CdrProblem).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Where a problem is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProblemState {
    Uninitialized,
    /// Mesh refined, cells partitioned, DoFs numbered.
    GeometrySet,
    /// Constraints closed, matrix and preconditioner built, solution zero.
    MatricesReady,
    /// Step `k` (0-based) is the last one completed.
    Stepping(usize),
    Done,
}

impl ProblemState {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ProblemState::Uninitialized => "Uninitialized",
            ProblemState::GeometrySet => "GeometrySet",
            ProblemState::MatricesReady => "MatricesReady",
            ProblemState::Stepping(_) => "Stepping",
            ProblemState::Done => "Done",
        }
    }
}

impl fmt::Display for ProblemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProblemState::Stepping(k) => write!(f, "Stepping({k})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Clock of one implicit step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    /// 0-based step index.
    pub step: usize,
    /// Time the step solves for, `t^{k+1}`.
    pub time: f64,
    pub time_step: f64,
}

/// What one step did.
#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    pub context: StepContext,
    pub iterations: usize,
    pub residual: f64,
    /// Manifest of the checkpoint written after the step, if any.
    pub checkpoint: Option<PathBuf>,
}

/// Outcome of [`CdrProblem::run`](super::CdrProblem::run).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub steps: usize,
    pub final_time: f64,
    /// Manifest paths in step order.
    pub checkpoints: Vec<PathBuf>,
    pub total_iterations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_step() {
        assert_eq!(ProblemState::Stepping(7).to_string(), "Stepping(7)");
        assert_eq!(ProblemState::GeometrySet.to_string(), "GeometrySet");
    }
}
