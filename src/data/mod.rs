//! Degrees of freedom and the constraints acting on them.

pub mod bc;
pub mod constraints;
pub mod dof_handler;
pub mod hanging_node_constraints;
pub mod index_set;

pub use constraints::{AffineConstraints, ConstraintLine, ConstraintTarget};
pub use dof_handler::DofHandler;
pub use index_set::IndexSet;
