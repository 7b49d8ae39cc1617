//! Enumeration of `Q_p` degrees of freedom on the shell mesh.
//!
//! Each cell carries `(p+1)^2` Lagrange nodes on an equispaced tensor grid.
//! Local node `(a, b)` (radial index `a`, angular index `b`) has local number
//! `b * (p + 1) + a`. A node is identified globally by its position on the
//! lattice scaled by `p`, so cells that share a point share the DoF. Nodes of a
//! fine cell that sit inside a coarser neighbour's face get their own DoF and
//! are later tied down by hanging-node constraints.
//!
//! Global numbers are assigned so that each rank owns one contiguous block:
//! a DoF belongs to the smallest rank owning a cell that contains it.

use crate::cdr_error::CdrError;
use crate::data::index_set::IndexSet;
use crate::discretization::runtime::map_point;
use crate::topology::shell::{CellKey, Face, ShellMesh};
use hashbrown::HashMap;
use std::ops::Range;

/// Position of a node on the `p`-scaled lattice: `(radial, angular)`.
pub type DofKey = (u64, u64);

/// Local node numbers on `face`, ordered along the face in ascending lattice
/// coordinate.
pub fn face_nodes(fe_order: usize, face: Face) -> Vec<usize> {
    let n = fe_order + 1;
    match face {
        Face::RadialLow => (0..n).map(|b| b * n).collect(),
        Face::RadialHigh => (0..n).map(|b| b * n + fe_order).collect(),
        Face::AngularLow => (0..n).collect(),
        Face::AngularHigh => (0..n).map(|a| fe_order * n + a).collect(),
    }
}

/// Scaled lattice key of local node `(a, b)` of `cell`.
pub fn node_key(cell: &CellKey, fe_order: usize, a: usize, b: usize, angular_period: u64) -> DofKey {
    let p = fe_order as u64;
    let h = cell.size();
    let r = p * cell.r0() + a as u64 * h;
    let t = (p * cell.t0() + b as u64 * h) % (p * angular_period);
    (r, t)
}

#[derive(Clone, Debug)]
pub struct DofHandler {
    fe_order: usize,
    dofs_per_cell: usize,
    cell_dofs: Vec<usize>,
    keys: Vec<DofKey>,
    /// First `(cell, local node)` holding each DoF.
    anchors: Vec<(usize, usize)>,
    owned_ranges: Vec<Range<usize>>,
}

impl DofHandler {
    /// Number the DoFs of `mesh` for elements of order `fe_order`.
    ///
    /// `cell_owner[c]` is the rank owning active cell `c`.
    pub fn distribute(
        mesh: &ShellMesh,
        fe_order: usize,
        cell_owner: &[usize],
        n_ranks: usize,
    ) -> Result<Self, CdrError> {
        if fe_order == 0 {
            return Err(CdrError::InvalidParameter {
                name: "fe_order",
                reason: "must be at least 1".into(),
            });
        }
        if cell_owner.len() != mesh.n_active_cells() {
            return Err(CdrError::Mesh(format!(
                "{} cell owners for {} active cells",
                cell_owner.len(),
                mesh.n_active_cells()
            )));
        }
        let n = fe_order + 1;
        let dofs_per_cell = n * n;
        let period = mesh.angular_period();

        // first pass: provisional numbers in encounter order, owner = min rank
        let mut provisional: HashMap<DofKey, usize> = HashMap::new();
        let mut keys: Vec<DofKey> = Vec::new();
        let mut owners: Vec<usize> = Vec::new();
        let mut anchors: Vec<(usize, usize)> = Vec::new();
        let mut cell_dofs = Vec::with_capacity(mesh.n_active_cells() * dofs_per_cell);
        for (idx, cell) in mesh.cells().iter().enumerate() {
            let owner = cell_owner[idx];
            if owner >= n_ranks {
                return Err(CdrError::Mesh(format!(
                    "cell {idx} assigned to rank {owner} of {n_ranks}"
                )));
            }
            for b in 0..n {
                for a in 0..n {
                    let key = node_key(&cell.key, fe_order, a, b, period);
                    let dof = *provisional.entry(key).or_insert_with(|| {
                        keys.push(key);
                        owners.push(owner);
                        anchors.push((idx, b * n + a));
                        keys.len() - 1
                    });
                    owners[dof] = owners[dof].min(owner);
                    cell_dofs.push(dof);
                }
            }
        }

        // second pass: stable sort by owner gives contiguous owned blocks
        let mut order: Vec<usize> = (0..keys.len()).collect();
        order.sort_by_key(|&d| owners[d]);
        let mut renumber = vec![0usize; keys.len()];
        for (new, &old) in order.iter().enumerate() {
            renumber[old] = new;
        }
        let mut owned_ranges = Vec::with_capacity(n_ranks);
        let mut start = 0;
        for rank in 0..n_ranks {
            let count = owners.iter().filter(|&&o| o == rank).count();
            owned_ranges.push(start..start + count);
            start += count;
        }
        for dof in &mut cell_dofs {
            *dof = renumber[*dof];
        }
        let keys = order.iter().map(|&old| keys[old]).collect();
        let anchors = order.iter().map(|&old| anchors[old]).collect();

        log::debug!(
            "distributed {} dofs (Q{fe_order}) over {n_ranks} ranks",
            start
        );
        Ok(Self {
            fe_order,
            dofs_per_cell,
            cell_dofs,
            keys,
            anchors,
            owned_ranges,
        })
    }

    pub fn fe_order(&self) -> usize {
        self.fe_order
    }

    pub fn dofs_per_cell(&self) -> usize {
        self.dofs_per_cell
    }

    pub fn n_dofs(&self) -> usize {
        self.keys.len()
    }

    /// Global DoF numbers of a cell in local node order.
    pub fn cell_dofs(&self, cell: usize) -> &[usize] {
        let start = cell * self.dofs_per_cell;
        &self.cell_dofs[start..start + self.dofs_per_cell]
    }

    pub fn owned_ranges(&self) -> &[Range<usize>] {
        &self.owned_ranges
    }

    pub fn dof_key(&self, dof: usize) -> DofKey {
        self.keys[dof]
    }

    /// Physical location of a DoF under the bilinear cell map the elements
    /// integrate with.
    pub fn support_point(&self, mesh: &ShellMesh, dof: usize) -> [f64; 2] {
        let (cell, local) = self.anchors[dof];
        map_point(&mesh.vertices(cell), self.reference_node(local))
    }

    /// Reference coordinates of local node `local`, radial first.
    pub fn reference_node(&self, local: usize) -> [f64; 2] {
        let n = self.fe_order + 1;
        let p = self.fe_order as f64;
        let (a, b) = (local % n, local / n);
        [-1.0 + 2.0 * a as f64 / p, -1.0 + 2.0 * b as f64 / p]
    }

    /// All DoFs touching the given cells.
    pub fn dofs_on_cells<I: IntoIterator<Item = usize>>(&self, cells: I) -> IndexSet {
        cells
            .into_iter()
            .flat_map(|c| self.cell_dofs(c).iter().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::manifold::SphericalManifold;

    fn mesh(refine: u32) -> ShellMesh {
        let mut m = ShellMesh::hyper_shell(1.0, 2.0, 8, false).unwrap();
        m.set_manifold(0, SphericalManifold::new([0.0, 0.0]));
        m.set_all_manifold_ids(0);
        m.refine_global(refine).unwrap();
        m
    }

    #[test]
    fn conforming_counts() {
        let m = mesh(1);
        // 16 angular x 2 radial cells; periodic in angle
        let owners = vec![0; m.n_active_cells()];
        let q1 = DofHandler::distribute(&m, 1, &owners, 1).unwrap();
        assert_eq!(q1.n_dofs(), 16 * 3);
        let q2 = DofHandler::distribute(&m, 2, &owners, 1).unwrap();
        assert_eq!(q2.n_dofs(), 32 * 5);
    }

    #[test]
    fn owned_blocks_follow_min_rank() {
        let m = mesh(1);
        let n = m.n_active_cells();
        let owners: Vec<usize> = (0..n).map(|c| c * 2 / n).collect();
        let dh = DofHandler::distribute(&m, 2, &owners, 2).unwrap();
        let ranges = dh.owned_ranges();
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[0].end, ranges[1].start);
        assert_eq!(ranges[1].end, dh.n_dofs());
        for c in 0..n {
            for &d in dh.cell_dofs(c) {
                // a dof owned by rank 1 never sits on a rank-0 cell
                if owners[c] == 0 {
                    assert!(ranges[0].contains(&d));
                }
            }
        }
    }

    #[test]
    fn support_points_lie_in_shell() {
        let m = mesh(1);
        let dh = DofHandler::distribute(&m, 3, &vec![0; m.n_active_cells()], 1).unwrap();
        for d in 0..dh.n_dofs() {
            let p = dh.support_point(&m, d);
            let r = p[0].hypot(p[1]);
            // chords of 16 sectors sag at most 2% below the inner circle
            assert!(r > 0.98 && r < 2.0 + 1e-12);
        }
    }

    #[test]
    fn support_points_match_every_cell_map() {
        let m = mesh(1);
        let dh = DofHandler::distribute(&m, 2, &vec![0; m.n_active_cells()], 1).unwrap();
        for cell in 0..m.n_active_cells() {
            let vertices = m.vertices(cell);
            for (local, &dof) in dh.cell_dofs(cell).iter().enumerate() {
                let mapped = map_point(&vertices, dh.reference_node(local));
                let support = dh.support_point(&m, dof);
                assert!((mapped[0] - support[0]).hypot(mapped[1] - support[1]) < 1e-12);
            }
        }
        // edge midpoints sit on the chord, not on the circle
        let outer = m.cells().iter().position(|c| c.key.i == 1).unwrap();
        let outer_mid = dh.cell_dofs(outer)[face_nodes(2, Face::RadialHigh)[1]];
        let p = dh.support_point(&m, outer_mid);
        let r = p[0].hypot(p[1]);
        assert!(r > 1.9 && r < 2.0 - 1e-3);
    }

    #[test]
    fn face_nodes_follow_layout() {
        assert_eq!(face_nodes(2, Face::RadialLow), vec![0, 3, 6]);
        assert_eq!(face_nodes(2, Face::RadialHigh), vec![2, 5, 8]);
        assert_eq!(face_nodes(2, Face::AngularLow), vec![0, 1, 2]);
        assert_eq!(face_nodes(2, Face::AngularHigh), vec![6, 7, 8]);
    }
}
