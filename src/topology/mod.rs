//! Mesh topology for the shell domain.
//!
//! - [`shell`]: the quadrilateral forest covering the annulus
//! - [`manifold`]: curved geometry used to place refined vertices
//! - [`ownership`]: how DoFs are split between ranks

pub mod manifold;
pub mod ownership;
pub mod shell;

pub use manifold::{ManifoldId, SphericalManifold};
pub use ownership::DofPartition;
pub use shell::{ActiveCell, BoundaryId, CellKey, Face, ShellMesh};
