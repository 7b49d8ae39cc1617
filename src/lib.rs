#![cfg_attr(docsrs, feature(doc_cfg))]
//! # shell-cdr
//!
//! shell-cdr solves a time-dependent convection–diffusion–reaction equation
//!
//! ```text
//! u_t - eps Δu + b·∇u + c u = f(x, t)
//! ```
//!
//! on a two-dimensional spherical shell, distributed over a group of
//! cooperating ranks that run the same program in lock step.
//!
//! ## Features
//! - Shell mesh on an integer polar lattice with manifold-aware refinement
//! - `Q_p` Lagrange elements with hanging-node and Dirichlet constraints
//! - Owned/relevant DoF partitions with explicit ghost synchronization
//! - Collective compress for matrices and vectors, restarted GMRES with
//!   rank-local preconditioners
//! - VTU fragments per rank plus a PVTU manifest per checkpoint
//! - Pluggable communication: serial, in-process threads, or MPI
//!   (`mpi-support` feature)
//!
//! ## Usage
//! ```no_run
//! use shell_cdr::prelude::*;
//!
//! let summaries = run_spmd(2, |comm| -> Result<RunSummary, CdrError> {
//!     let mut problem = CdrProblem::new(Parameters::default(), comm)?;
//!     problem.run()
//! });
//! for summary in summaries {
//!     println!("{:?}", summary.map(|s| s.final_time));
//! }
//! ```
//!
//! ## Determinism
//!
//! Every reduction is summed in rank order on every rank, so all ranks see
//! identical norms and take identical convergence decisions.

pub mod algs;
pub mod cdr_error;
pub mod data;
pub mod discretization;
pub mod expr;
pub mod io;
pub mod lac;
pub mod params;
pub mod physics;
pub mod solver;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::communicator::{Communicator, LocalComm, NoComm, run_spmd};
    pub use crate::cdr_error::CdrError;
    pub use crate::data::constraints::{AffineConstraints, ConstraintTarget};
    pub use crate::data::dof_handler::DofHandler;
    pub use crate::data::index_set::IndexSet;
    pub use crate::expr::FunctionParser;
    pub use crate::lac::gmres::{SolverControl, SolverGmres};
    pub use crate::lac::precondition::Preconditioner;
    pub use crate::lac::sparse::DistributedMatrix;
    pub use crate::lac::vector::{DistributedVector, GhostedVector};
    pub use crate::params::{OutputSettings, Parameters, PreconditionerKind, SolverSettings};
    pub use crate::solver::{CdrProblem, ProblemState, RunSummary, StepContext};
    pub use crate::topology::ownership::DofPartition;
    pub use crate::topology::shell::ShellMesh;
}
