//! Parallel algorithms: message passing, partitioning and assembly.

pub mod assembly;
pub mod communicator;
pub mod partition;
pub mod wire;

pub use assembly::{AssemblyContext, OperatorCoefficients, assemble_rhs, assemble_system_matrix};
pub use communicator::{Communicator, LocalComm, NoComm, run_spmd};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use partition::{CellPartition, dof_partition};
