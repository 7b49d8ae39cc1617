//! Hanging node constraints: continuity across refinement level changes.
//!
//! Where a cell's face borders a coarser neighbour, the fine face nodes that
//! are not also nodes of the coarse face are tied to the coarse face trace:
//! `u_fine = Σ_m L_m(s) u_coarse_m`, with `L_m` the 1-D Lagrange polynomials
//! on the coarse face's equispaced nodes and `s` the fine node's position
//! along that face.

use crate::cdr_error::CdrError;
use crate::data::constraints::AffineConstraints;
use crate::data::dof_handler::{DofHandler, face_nodes};
use crate::topology::shell::{Face, ShellMesh};

/// Value at `s` of the Lagrange polynomial through `m/p`, `m = 0..=p`, that is
/// one at node `k`.
pub fn lagrange_1d(fe_order: usize, k: usize, s: f64) -> f64 {
    let p = fe_order as f64;
    let xk = k as f64 / p;
    (0..=fe_order)
        .filter(|&m| m != k)
        .map(|m| {
            let xm = m as f64 / p;
            (s - xm) / (xk - xm)
        })
        .product()
}

/// Lattice interval `[start, start + len)` of a face along its varying coordinate,
/// on the `p`-scaled lattice.
fn face_span(mesh: &ShellMesh, cell: usize, face: Face, fe_order: u64) -> (u64, u64) {
    let key = mesh.cell(cell).key;
    let start = if face.is_radial() { key.t0() } else { key.r0() };
    (fe_order * start, fe_order * key.size())
}

/// Add the hanging-node constraints of `mesh` to `constraints`; returns how
/// many new lines were added.
pub fn make_hanging_node_constraints(
    mesh: &ShellMesh,
    dofs: &DofHandler,
    constraints: &mut AffineConstraints,
) -> Result<usize, CdrError> {
    let p = dofs.fe_order();
    let scaled_period = p as u64 * mesh.angular_period();
    let mut added = 0;
    for cell in 0..mesh.n_active_cells() {
        let fine_level = mesh.cell(cell).key.level;
        for face in Face::ALL {
            let Some(neighbor) = mesh.neighbor(cell, face) else {
                continue;
            };
            if mesh.cell(neighbor).key.level >= fine_level {
                continue;
            }
            let coarse_face = face.opposite();
            let (fine_start, fine_len) = face_span(mesh, cell, face, p as u64);
            let (coarse_start, coarse_len) = face_span(mesh, neighbor, coarse_face, p as u64);
            let coarse_dofs: Vec<usize> = face_nodes(p, coarse_face)
                .into_iter()
                .map(|local| dofs.cell_dofs(neighbor)[local])
                .collect();
            let step = fine_len / p as u64;
            for (k, local) in face_nodes(p, face).into_iter().enumerate() {
                let position = fine_start + k as u64 * step;
                let offset = if face.is_radial() {
                    (position + scaled_period - coarse_start) % scaled_period
                } else {
                    position - coarse_start
                };
                if offset > coarse_len {
                    return Err(CdrError::Mesh(format!(
                        "cell {cell}: face {face:?} is not covered by neighbour {neighbor}"
                    )));
                }
                // coincides with a coarse node: same DoF, nothing to constrain
                if offset % (coarse_len / p as u64) == 0 {
                    continue;
                }
                let s = offset as f64 / coarse_len as f64;
                let entries: Vec<(usize, f64)> = coarse_dofs
                    .iter()
                    .enumerate()
                    .map(|(m, &dof)| (dof, lagrange_1d(p, m, s)))
                    .collect();
                let fine_dof = dofs.cell_dofs(cell)[local];
                if constraints.add_line(fine_dof, entries, 0.0) {
                    added += 1;
                }
            }
        }
    }
    log::debug!("{added} hanging node constraints");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lagrange_partition_of_unity() {
        for p in 1..=4 {
            for s in [0.1, 0.25, 0.6, 0.9] {
                let sum: f64 = (0..=p).map(|k| lagrange_1d(p, k, s)).sum();
                assert!((sum - 1.0).abs() < 1e-13);
            }
            assert_eq!(lagrange_1d(p, 0, 0.0), 1.0);
        }
    }
}
