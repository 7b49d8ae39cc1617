//! Dirichlet boundary constraints selected by boundary indicator.

use crate::data::constraints::AffineConstraints;
use crate::data::dof_handler::{DofHandler, face_nodes};
use crate::topology::shell::{BoundaryId, Face, ShellMesh};

/// Constrain every DoF on faces with indicator `boundary` to zero.
///
/// DoFs that already carry a line keep it. Returns the number of lines added.
pub fn make_zero_dirichlet_constraints(
    mesh: &ShellMesh,
    dofs: &DofHandler,
    boundary: BoundaryId,
    constraints: &mut AffineConstraints,
) -> usize {
    make_dirichlet_constraints(mesh, dofs, boundary, constraints, |_| 0.0)
}

/// Constrain DoFs on faces with indicator `boundary` to `value(support_point)`.
pub fn make_dirichlet_constraints<F>(
    mesh: &ShellMesh,
    dofs: &DofHandler,
    boundary: BoundaryId,
    constraints: &mut AffineConstraints,
    value: F,
) -> usize
where
    F: Fn([f64; 2]) -> f64,
{
    let mut added = 0;
    for cell in 0..mesh.n_active_cells() {
        for face in Face::ALL {
            if mesh.boundary_id(cell, face) != Some(boundary) {
                continue;
            }
            for local in face_nodes(dofs.fe_order(), face) {
                let dof = dofs.cell_dofs(cell)[local];
                if constraints.is_constrained(dof) {
                    continue;
                }
                let g = value(dofs.support_point(mesh, dof));
                if constraints.add_line(dof, Vec::new(), g) {
                    added += 1;
                }
            }
        }
    }
    log::debug!("{added} Dirichlet constraints on boundary {boundary}");
    added
}
