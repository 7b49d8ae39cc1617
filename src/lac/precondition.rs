//! Preconditioners acting on the locally owned block.
//!
//! All preconditioners here are rank-local (block Jacobi in the parallel
//! sense): applying them needs no communication.

use crate::cdr_error::CdrError;
use crate::lac::sparse::DistributedMatrix;
use crate::params::PreconditionerKind;

pub trait Preconditioner {
    /// `dst = P^{-1} src` on owned entries.
    fn vmult(&self, dst: &mut [f64], src: &[f64]);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Identity;

impl Preconditioner for Identity {
    fn vmult(&self, dst: &mut [f64], src: &[f64]) {
        dst.copy_from_slice(src);
    }
}

#[derive(Clone, Debug)]
pub struct Jacobi {
    inv_diag: Vec<f64>,
}

impl Jacobi {
    pub fn new(matrix: &DistributedMatrix) -> Result<Self, CdrError> {
        let inv_diag = matrix
            .diagonal()
            .into_iter()
            .enumerate()
            .map(|(row, d)| {
                if d == 0.0 {
                    Err(CdrError::ZeroPivot {
                        row: matrix.owned_range().start + row,
                    })
                } else {
                    Ok(1.0 / d)
                }
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { inv_diag })
    }
}

impl Preconditioner for Jacobi {
    fn vmult(&self, dst: &mut [f64], src: &[f64]) {
        for ((d, s), inv) in dst.iter_mut().zip(src).zip(&self.inv_diag) {
            *d = s * inv;
        }
    }
}

/// ILU(0) of the owned diagonal block.
#[derive(Clone, Debug)]
pub struct BlockIlu0 {
    row_ptr: Vec<usize>,
    cols: Vec<usize>,
    /// Combined factors: strict lower part is `L` (unit diagonal), the rest `U`.
    lu: Vec<f64>,
    diag: Vec<usize>,
}

impl BlockIlu0 {
    pub fn new(matrix: &DistributedMatrix) -> Result<Self, CdrError> {
        let (row_ptr, cols, mut lu) = matrix.owned_block();
        let n = row_ptr.len() - 1;
        let offset = matrix.owned_range().start;
        let mut diag = vec![usize::MAX; n];
        for i in 0..n {
            for k in row_ptr[i]..row_ptr[i + 1] {
                if cols[k] == i {
                    diag[i] = k;
                }
            }
            if diag[i] == usize::MAX {
                return Err(CdrError::ZeroPivot { row: offset + i });
            }
        }

        // IKJ variant restricted to the existing pattern
        let mut position = vec![usize::MAX; n];
        for i in 0..n {
            for k in row_ptr[i]..row_ptr[i + 1] {
                position[cols[k]] = k;
            }
            for kk in row_ptr[i]..row_ptr[i + 1] {
                let k = cols[kk];
                if k >= i {
                    break;
                }
                let pivot = lu[diag[k]];
                if pivot == 0.0 {
                    return Err(CdrError::ZeroPivot { row: offset + k });
                }
                lu[kk] /= pivot;
                let factor = lu[kk];
                for jj in diag[k] + 1..row_ptr[k + 1] {
                    let p = position[cols[jj]];
                    if p != usize::MAX {
                        lu[p] -= factor * lu[jj];
                    }
                }
            }
            for k in row_ptr[i]..row_ptr[i + 1] {
                position[cols[k]] = usize::MAX;
            }
            if lu[diag[i]] == 0.0 {
                return Err(CdrError::ZeroPivot { row: offset + i });
            }
        }
        Ok(Self {
            row_ptr,
            cols,
            lu,
            diag,
        })
    }
}

impl Preconditioner for BlockIlu0 {
    fn vmult(&self, dst: &mut [f64], src: &[f64]) {
        let n = self.diag.len();
        for i in 0..n {
            let mut s = src[i];
            for k in self.row_ptr[i]..self.diag[i] {
                s -= self.lu[k] * dst[self.cols[k]];
            }
            dst[i] = s;
        }
        for i in (0..n).rev() {
            let mut s = dst[i];
            for k in self.diag[i] + 1..self.row_ptr[i + 1] {
                s -= self.lu[k] * dst[self.cols[k]];
            }
            dst[i] = s / self.lu[self.diag[i]];
        }
    }
}

/// Build the preconditioner selected in the solver settings.
pub fn build_preconditioner(
    kind: PreconditionerKind,
    matrix: &DistributedMatrix,
) -> Result<Box<dyn Preconditioner + Send + Sync>, CdrError> {
    Ok(match kind {
        PreconditionerKind::Identity => Box::new(Identity),
        PreconditionerKind::Jacobi => Box::new(Jacobi::new(matrix)?),
        PreconditionerKind::Ilu0 => Box::new(BlockIlu0::new(matrix)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::NoComm;
    use crate::data::index_set::IndexSet;
    use crate::lac::sparse::MatrixBuilder;
    use crate::topology::ownership::DofPartition;

    fn tridiagonal(n: usize) -> DistributedMatrix {
        let p = DofPartition::new(0, vec![0..n], IndexSet::from_range(0..n)).unwrap();
        let mut b = MatrixBuilder::new(&p);
        for i in 0..n {
            b.add(i, i, 4.0);
            if i > 0 {
                b.add(i, i - 1, -1.0);
            }
            if i + 1 < n {
                b.add(i, i + 1, -2.0);
            }
        }
        b.compress(&NoComm).unwrap()
    }

    #[test]
    fn ilu0_is_exact_for_tridiagonal() {
        // no fill-in for a tridiagonal matrix, so ILU(0) = LU
        let a = tridiagonal(5);
        let ilu = BlockIlu0::new(&a).unwrap();
        let x = [1.0, -2.0, 0.5, 3.0, 1.0];
        let mut b = vec![0.0; 5];
        for (i, bi) in b.iter_mut().enumerate() {
            *bi = (0..5).map(|j| a.el(i, j) * x[j]).sum();
        }
        let mut y = vec![0.0; 5];
        ilu.vmult(&mut y, &b);
        for (yi, xi) in y.iter().zip(x) {
            assert!((yi - xi).abs() < 1e-12);
        }
    }

    #[test]
    fn jacobi_inverts_diagonal() {
        let a = tridiagonal(3);
        let j = Jacobi::new(&a).unwrap();
        let mut y = [0.0; 3];
        j.vmult(&mut y, &[4.0, 8.0, -4.0]);
        assert_eq!(y, [1.0, 2.0, -1.0]);
    }
}
