//! Backward Euler cell kernels.
//!
//! One step of `u_t - eps Δu + b·∇u + c u = f` reads
//! `(M + dt A) u^{n+1} = M u^n + dt F(t^{n+1})`, with
//! `A_ij = ∫ eps ∇φ_j·∇φ_i + (b·∇φ_j) φ_i + c φ_j φ_i`.

use crate::discretization::runtime::{ElementRuntime, ElementTabulation};

/// Coefficients of one cell, sampled at its quadrature points.
#[derive(Clone, Copy, Debug)]
pub struct CellCoefficients<'a> {
    pub diffusion: f64,
    pub reaction: f64,
    /// Convection velocity per quadrature point.
    pub convection: &'a [[f64; 2]],
}

/// Dense cell matrix `M + dt A`, row-major, into `out`.
pub fn cell_matrix(
    runtime: &ElementRuntime,
    tab: &ElementTabulation,
    coefficients: &CellCoefficients<'_>,
    time_step: f64,
    out: &mut [f64],
) {
    let n = runtime.dofs_per_cell();
    debug_assert_eq!(out.len(), n * n);
    debug_assert_eq!(coefficients.convection.len(), runtime.n_q_points());
    out.fill(0.0);
    for qp in 0..runtime.n_q_points() {
        let phi = &runtime.values[qp];
        let grad = &tab.gradients[qp];
        let b = coefficients.convection[qp];
        let jxw = tab.jxw[qp];
        for i in 0..n {
            for j in 0..n {
                let mass = phi[i] * phi[j];
                let diffusion = grad[j][0] * grad[i][0] + grad[j][1] * grad[i][1];
                let convection = (b[0] * grad[j][0] + b[1] * grad[j][1]) * phi[i];
                out[i * n + j] += jxw
                    * (mass
                        + time_step
                            * (coefficients.diffusion * diffusion
                                + convection
                                + coefficients.reaction * mass));
            }
        }
    }
}

/// Cell rhs `M u_old + dt F`, with `forcing` sampled per quadrature point.
pub fn cell_rhs(
    runtime: &ElementRuntime,
    tab: &ElementTabulation,
    old_solution: &[f64],
    forcing: &[f64],
    time_step: f64,
    out: &mut [f64],
) {
    debug_assert_eq!(out.len(), runtime.dofs_per_cell());
    out.fill(0.0);
    for qp in 0..runtime.n_q_points() {
        let phi = &runtime.values[qp];
        let u_old: f64 = phi.iter().zip(old_solution).map(|(p, u)| p * u).sum();
        let source = (u_old + time_step * forcing[qp]) * tab.jxw[qp];
        for (slot, p) in out.iter_mut().zip(phi) {
            *slot += source * p;
        }
    }
}

/// `∫ u_h` over one cell for local coefficients `local`.
pub fn integrate(runtime: &ElementRuntime, tab: &ElementTabulation, local: &[f64]) -> f64 {
    (0..runtime.n_q_points())
        .map(|qp| {
            let u: f64 = runtime.values[qp].iter().zip(local).map(|(p, u)| p * u).sum();
            u * tab.jxw[qp]
        })
        .sum()
}
