//! Distributed linear algebra: vectors, sparse matrices, preconditioners and
//! the Krylov solver used by the time stepper.

pub mod ghost;
pub mod gmres;
pub mod precondition;
pub mod sparse;
pub mod vector;

pub use ghost::GhostImporter;
pub use gmres::{SolveStats, SolverControl, SolverGmres};
pub use precondition::{BlockIlu0, Identity, Jacobi, Preconditioner, build_preconditioner};
pub use sparse::{DistributedMatrix, MatrixBuilder};
pub use vector::{DistributedVector, GhostedVector, VectorBuilder};
