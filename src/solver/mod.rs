//! Time-stepping solver: lifecycle state machine and run driver.

pub mod problem;
pub mod state;

pub use problem::CdrProblem;
pub use state::{ProblemState, RunSummary, StepContext, StepReport};
