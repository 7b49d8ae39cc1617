//! Cell kernels of the convection–diffusion–reaction operator.

pub mod fe;

pub use fe::{CellCoefficients, cell_matrix, cell_rhs, integrate};
