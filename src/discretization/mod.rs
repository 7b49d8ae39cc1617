//! Reference-cell basis/quadrature tables and per-cell geometry.

pub mod runtime;

pub use runtime::{
    ElementRuntime, ElementTabulation, LagrangeBasis, QuadratureRule, gauss_legendre_1d,
    map_point, tabulate_element,
};
