//! Restarted GMRES with right preconditioning.
//!
//! Solves `A x = b` for a [`DistributedMatrix`]. The Arnoldi basis is built
//! with modified Gram–Schmidt and the least-squares problem is kept upper
//! triangular with Givens rotations, so the residual norm is known at every
//! iteration without forming `x`. Right preconditioning means that residual
//! is the true residual of the unpreconditioned system. Every reduction goes
//! through the communicator, so all ranks stop at the same iteration.

use crate::algs::communicator::Communicator;
use crate::cdr_error::CdrError;
use crate::lac::precondition::Preconditioner;
use crate::lac::sparse::DistributedMatrix;
use crate::lac::vector::DistributedVector;

/// Stopping rule: absolute residual `tolerance`, at most `max_steps` iterations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverControl {
    pub max_steps: usize,
    pub tolerance: f64,
}

/// Outcome of a converged solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolveStats {
    pub iterations: usize,
    pub residual: f64,
}

#[derive(Clone, Debug)]
pub struct SolverGmres {
    restart: usize,
}

impl SolverGmres {
    pub fn new(restart: usize) -> Self {
        Self {
            restart: restart.max(1),
        }
    }

    pub fn restart(&self) -> usize {
        self.restart
    }

    /// Collective: improve `x` (the initial guess) until `‖b - A x‖ <= tolerance`.
    ///
    /// Hitting `max_steps` first returns [`CdrError::SolverNotConverged`] with
    /// `step: None`; `x` then holds the last iterate.
    pub fn solve<C, P>(
        &self,
        control: SolverControl,
        matrix: &DistributedMatrix,
        x: &mut DistributedVector,
        b: &DistributedVector,
        precondition: &P,
        comm: &C,
    ) -> Result<SolveStats, CdrError>
    where
        C: Communicator + ?Sized,
        P: Preconditioner + ?Sized,
    {
        let m = self.restart;
        let mut r = x.zeros_like();
        let mut w = x.zeros_like();
        let mut basis: Vec<DistributedVector> = Vec::with_capacity(m + 1);
        let mut preconditioned: Vec<DistributedVector> = Vec::with_capacity(m);
        let mut iterations = 0;

        matrix.residual(&mut r, x, b, comm)?;
        let mut residual = r.l2_norm(comm)?;
        loop {
            if residual <= control.tolerance {
                return Ok(SolveStats {
                    iterations,
                    residual,
                });
            }
            if iterations >= control.max_steps {
                return Err(CdrError::SolverNotConverged {
                    step: None,
                    iterations,
                    residual,
                    tolerance: control.tolerance,
                });
            }

            basis.clear();
            preconditioned.clear();
            let mut v0 = r.clone();
            v0.scale(1.0 / residual);
            basis.push(v0);
            let mut h = vec![vec![0.0; m]; m + 1];
            let mut cs = vec![0.0; m];
            let mut sn = vec![0.0; m];
            let mut g = vec![0.0; m + 1];
            g[0] = residual;

            let mut k = 0;
            while k < m && iterations < control.max_steps {
                let mut z = x.zeros_like();
                precondition.vmult(z.as_mut_slice(), basis[k].as_slice());
                matrix.vmult(&mut w, &z, comm)?;
                preconditioned.push(z);
                iterations += 1;

                for (i, v) in basis.iter().enumerate() {
                    h[i][k] = w.dot(v, comm)?;
                    w.axpy(-h[i][k], v);
                }
                let norm = w.l2_norm(comm)?;
                h[k + 1][k] = norm;

                for i in 0..k {
                    let (hi, hj) = (h[i][k], h[i + 1][k]);
                    h[i][k] = cs[i] * hi + sn[i] * hj;
                    h[i + 1][k] = -sn[i] * hi + cs[i] * hj;
                }
                let (hk, hk1) = (h[k][k], h[k + 1][k]);
                let rho = hk.hypot(hk1);
                if rho == 0.0 {
                    cs[k] = 1.0;
                    sn[k] = 0.0;
                } else {
                    cs[k] = hk / rho;
                    sn[k] = hk1 / rho;
                }
                h[k][k] = rho;
                h[k + 1][k] = 0.0;
                g[k + 1] = -sn[k] * g[k];
                g[k] *= cs[k];
                residual = g[k + 1].abs();
                k += 1;

                log::trace!("gmres iteration {iterations}: residual {residual:e}");
                if residual <= control.tolerance || norm == 0.0 {
                    break;
                }
                let mut next = w.clone();
                next.scale(1.0 / norm);
                basis.push(next);
            }

            // back substitution on the k x k triangle, then x += Z y
            let mut y = vec![0.0; k];
            for i in (0..k).rev() {
                let mut s = g[i];
                for j in i + 1..k {
                    s -= h[i][j] * y[j];
                }
                y[i] = if h[i][i] == 0.0 { 0.0 } else { s / h[i][i] };
            }
            for (yi, z) in y.iter().zip(&preconditioned) {
                x.axpy(*yi, z);
            }

            matrix.residual(&mut r, x, b, comm)?;
            residual = r.l2_norm(comm)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, run_spmd};
    use crate::data::index_set::IndexSet;
    use crate::lac::precondition::{BlockIlu0, Identity};
    use crate::lac::sparse::MatrixBuilder;
    use crate::topology::ownership::DofPartition;

    fn convection_diffusion(p: &DofPartition, n: usize) -> DistributedMatrix {
        let mut b = MatrixBuilder::new(p);
        for i in p.owned_range() {
            b.add(i, i, 3.0);
            if i > 0 {
                b.add(i, i - 1, -1.5);
            }
            if i + 1 < n {
                b.add(i, i + 1, -0.5);
            }
        }
        b.compress(&NoComm).unwrap()
    }

    #[test]
    fn converges_on_nonsymmetric_system() {
        let n = 40;
        let p = DofPartition::new(0, vec![0..n], IndexSet::from_range(0..n)).unwrap();
        let a = convection_diffusion(&p, n);
        let mut b = DistributedVector::from_partition(&p);
        b.fill(1.0);
        let mut x = b.zeros_like();
        let control = SolverControl {
            max_steps: 500,
            tolerance: 1e-10,
        };
        let stats = SolverGmres::new(8)
            .solve(control, &a, &mut x, &b, &Identity, &NoComm)
            .unwrap();
        assert!(stats.iterations > 8, "should have restarted");
        let mut r = x.zeros_like();
        a.residual(&mut r, &x, &b, &NoComm).unwrap();
        assert!(r.l2_norm(&NoComm).unwrap() <= 1e-10);
    }

    #[test]
    fn iteration_cap_is_reported() {
        let n = 40;
        let p = DofPartition::new(0, vec![0..n], IndexSet::from_range(0..n)).unwrap();
        let a = convection_diffusion(&p, n);
        let mut b = DistributedVector::from_partition(&p);
        b.fill(1.0);
        let mut x = b.zeros_like();
        let control = SolverControl {
            max_steps: 1,
            tolerance: 1e-14,
        };
        let err = SolverGmres::new(30)
            .solve(control, &a, &mut x, &b, &Identity, &NoComm)
            .unwrap_err();
        assert!(matches!(err, CdrError::SolverNotConverged { iterations: 1, .. }));
    }

    #[test]
    fn distributed_solve_matches_serial() {
        let n = 30;
        let solve = |comm: &dyn Communicator| {
            let ranges: Vec<_> = (0..comm.size())
                .map(|r| r * n / comm.size()..(r + 1) * n / comm.size())
                .collect();
            let mine = ranges[comm.rank()].clone();
            let p = DofPartition::new(comm.rank(), ranges, IndexSet::from_range(mine)).unwrap();
            let mut builder = MatrixBuilder::new(&p);
            for i in p.owned_range() {
                builder.add(i, i, 3.0);
                if i > 0 {
                    builder.add(i, i - 1, -1.5);
                }
                if i + 1 < n {
                    builder.add(i, i + 1, -0.5);
                }
            }
            let a = builder.compress(comm).unwrap();
            let mut b = DistributedVector::from_partition(&p);
            b.fill(1.0);
            let mut x = b.zeros_like();
            let ilu = BlockIlu0::new(&a).unwrap();
            let control = SolverControl {
                max_steps: n,
                tolerance: 1e-11,
            };
            SolverGmres::new(10)
                .solve(control, &a, &mut x, &b, &ilu, comm)
                .unwrap();
            x.as_slice().to_vec()
        };
        let serial = solve(&NoComm);
        let parts = run_spmd(3, |comm| solve(&comm));
        let joined: Vec<f64> = parts.concat();
        for (a, b) in serial.iter().zip(&joined) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
