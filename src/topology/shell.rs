//! Quadrilateral mesh of a two-dimensional spherical shell (annulus).
//!
//! The coarse mesh has `n_coarse` angular sectors and a single radial layer,
//! matching the classic `hyper_shell` layout. Every cell is a dyadic
//! sub-rectangle of an integer lattice in (radius, angle): a coarse cell spans
//! [`SIDE`] lattice units in each direction and a cell on level `l` spans
//! `SIDE >> l`. With the spherical manifold attached, a lattice point maps to
//! the Cartesian point at the corresponding radius and angle, so refinement
//! follows the true circles instead of the coarse polygon.
//!
//! Active cells are stored in space-filling-curve order (coarse sector, then
//! Morton order of the lower corner); this order drives partitioning.

use crate::cdr_error::CdrError;
use crate::topology::manifold::{ManifoldId, SphericalManifold};
use hashbrown::HashMap;
use itertools::Itertools;

/// Lattice depth: a coarse cell is `2^LATTICE_DEPTH` units wide.
pub const LATTICE_DEPTH: u32 = 16;
/// Lattice units per coarse cell side.
pub const SIDE: u64 = 1 << LATTICE_DEPTH;
/// Deepest refinement level; cells stay at least two lattice units wide so the
/// odd lattice points used for point location never sit on a cell boundary.
pub const MAX_LEVEL: u32 = LATTICE_DEPTH - 1;

/// Boundary indicator of a face.
pub type BoundaryId = u8;

/// Identifies a cell in the refinement forest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub coarse: u32,
    pub level: u32,
    /// Radial index on `level`.
    pub i: u64,
    /// Angular index on `level`, relative to the coarse sector.
    pub j: u64,
}

impl CellKey {
    /// Side length in lattice units.
    #[inline]
    pub fn size(&self) -> u64 {
        SIDE >> self.level
    }

    #[inline]
    pub fn r0(&self) -> u64 {
        self.i * self.size()
    }

    #[inline]
    pub fn r1(&self) -> u64 {
        self.r0() + self.size()
    }

    /// Global angular lattice coordinate of the lower edge.
    #[inline]
    pub fn t0(&self) -> u64 {
        self.coarse as u64 * SIDE + self.j * self.size()
    }

    #[inline]
    pub fn t1(&self) -> u64 {
        self.t0() + self.size()
    }

    fn children(&self) -> [CellKey; 4] {
        let level = self.level + 1;
        let (i, j) = (2 * self.i, 2 * self.j);
        [
            CellKey { coarse: self.coarse, level, i, j },
            CellKey { coarse: self.coarse, level, i: i + 1, j },
            CellKey { coarse: self.coarse, level, i, j: j + 1 },
            CellKey { coarse: self.coarse, level, i: i + 1, j: j + 1 },
        ]
    }

    fn curve_key(&self) -> (u32, u64) {
        (self.coarse, morton(self.r0(), self.j * self.size()))
    }
}

fn morton(a: u64, b: u64) -> u64 {
    let mut code = 0u64;
    for bit in 0..=LATTICE_DEPTH {
        code |= ((a >> bit) & 1) << (2 * bit);
        code |= ((b >> bit) & 1) << (2 * bit + 1);
    }
    code
}

/// Faces of a cell in reference orientation: `xi` runs radially, `eta` angularly.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Face {
    /// `xi = -1`, lower radius.
    RadialLow,
    /// `xi = +1`, upper radius.
    RadialHigh,
    /// `eta = -1`, lower angle.
    AngularLow,
    /// `eta = +1`, upper angle.
    AngularHigh,
}

impl Face {
    pub const ALL: [Face; 4] = [
        Face::RadialLow,
        Face::RadialHigh,
        Face::AngularLow,
        Face::AngularHigh,
    ];

    /// Face of the neighbour that touches this one.
    pub fn opposite(self) -> Face {
        match self {
            Face::RadialLow => Face::RadialHigh,
            Face::RadialHigh => Face::RadialLow,
            Face::AngularLow => Face::AngularHigh,
            Face::AngularHigh => Face::AngularLow,
        }
    }

    /// Whether the face lies on a circle (its points vary in angle).
    pub fn is_radial(self) -> bool {
        matches!(self, Face::RadialLow | Face::RadialHigh)
    }
}

/// An active (leaf) cell.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ActiveCell {
    pub key: CellKey,
    pub manifold_id: Option<ManifoldId>,
}

/// Mesh of the region between two concentric circles.
#[derive(Clone, Debug)]
pub struct ShellMesh {
    inner_radius: f64,
    outer_radius: f64,
    n_coarse: usize,
    colorize: bool,
    manifold: Option<(ManifoldId, SphericalManifold)>,
    cells: Vec<ActiveCell>,
    lookup: HashMap<CellKey, usize>,
    max_level: u32,
}

impl ShellMesh {
    /// Coarse shell with `n_coarse` sectors around `center`.
    ///
    /// With `colorize` the inner circle carries boundary id 0 and the outer
    /// circle id 1; otherwise the whole boundary has id 0.
    pub fn hyper_shell(
        inner_radius: f64,
        outer_radius: f64,
        n_coarse: usize,
        colorize: bool,
    ) -> Result<Self, CdrError> {
        if !(inner_radius > 0.0 && outer_radius > inner_radius) {
            return Err(CdrError::Mesh(format!(
                "invalid shell radii {inner_radius}..{outer_radius}"
            )));
        }
        if n_coarse < 3 {
            return Err(CdrError::Mesh(format!(
                "a shell needs at least 3 coarse cells, got {n_coarse}"
            )));
        }
        let cells = (0..n_coarse as u32)
            .map(|coarse| ActiveCell {
                key: CellKey {
                    coarse,
                    level: 0,
                    i: 0,
                    j: 0,
                },
                manifold_id: None,
            })
            .collect();
        let mut mesh = Self {
            inner_radius,
            outer_radius,
            n_coarse,
            colorize,
            manifold: None,
            cells,
            lookup: HashMap::new(),
            max_level: 0,
        };
        mesh.reorder();
        Ok(mesh)
    }

    /// Register the geometry used for cells tagged with `id`.
    pub fn set_manifold(&mut self, id: ManifoldId, manifold: SphericalManifold) {
        self.manifold = Some((id, manifold));
    }

    /// Tag every active cell with `id`.
    pub fn set_all_manifold_ids(&mut self, id: ManifoldId) {
        for cell in &mut self.cells {
            cell.manifold_id = Some(id);
        }
    }

    pub fn inner_radius(&self) -> f64 {
        self.inner_radius
    }

    pub fn outer_radius(&self) -> f64 {
        self.outer_radius
    }

    pub fn n_coarse_cells(&self) -> usize {
        self.n_coarse
    }

    pub fn n_active_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cells(&self) -> &[ActiveCell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> &ActiveCell {
        &self.cells[index]
    }

    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Angular lattice period (the full circle).
    pub fn angular_period(&self) -> u64 {
        self.n_coarse as u64 * SIDE
    }

    /// Refine every active cell `times` times.
    pub fn refine_global(&mut self, times: u32) -> Result<(), CdrError> {
        for _ in 0..times {
            self.refine_where(|_, _| true)?;
        }
        Ok(())
    }

    /// Refine the active cells selected by `marker`; returns how many were refined.
    ///
    /// Only meant for setup. Refined cells must carry a manifold id with an
    /// attached manifold so new vertices can be placed.
    pub fn refine_where<F>(&mut self, marker: F) -> Result<usize, CdrError>
    where
        F: Fn(&ShellMesh, usize) -> bool,
    {
        let marked: Vec<bool> = (0..self.cells.len()).map(|c| marker(self, c)).collect();
        let mut next = Vec::with_capacity(self.cells.len() * 2);
        let mut refined = 0;
        for (cell, &mark) in self.cells.iter().zip(&marked) {
            if !mark {
                next.push(*cell);
                continue;
            }
            if cell.key.level >= MAX_LEVEL {
                return Err(CdrError::Mesh(format!(
                    "cannot refine beyond level {MAX_LEVEL}"
                )));
            }
            match (cell.manifold_id, self.manifold) {
                (Some(id), Some((attached, _))) if id == attached => {}
                _ => {
                    return Err(CdrError::Mesh(format!(
                        "cell {:?} has no attached manifold; refinement needs curved geometry",
                        cell.key
                    )));
                }
            }
            refined += 1;
            for child in cell.key.children() {
                next.push(ActiveCell {
                    key: child,
                    manifold_id: cell.manifold_id,
                });
            }
        }
        self.cells = next;
        self.reorder();
        log::debug!(
            "refined {refined} cells; {} active cells, max level {}",
            self.cells.len(),
            self.max_level
        );
        Ok(refined)
    }

    fn reorder(&mut self) {
        self.cells.sort_by_key(|c| c.key.curve_key());
        self.lookup = self
            .cells
            .iter()
            .enumerate()
            .map(|(idx, c)| (c.key, idx))
            .collect();
        self.max_level = self.cells.iter().map(|c| c.key.level).max().unwrap_or(0);
    }

    /// Active cell containing the lattice point `(r, t)`.
    ///
    /// `t` wraps around the circle. Points on cell boundaries are ambiguous;
    /// callers query odd lattice points, which never are.
    pub fn locate(&self, r: i64, t: i64) -> Option<usize> {
        if r < 0 || r >= SIDE as i64 {
            return None;
        }
        let t = t.rem_euclid(self.angular_period() as i64) as u64;
        let r = r as u64;
        let coarse = (t / SIDE) as u32;
        let local = t % SIDE;
        (0..=self.max_level).find_map(|level| {
            let size = SIDE >> level;
            let key = CellKey {
                coarse,
                level,
                i: r / size,
                j: local / size,
            };
            self.lookup.get(&key).copied()
        })
    }

    /// The active cell on the other side of `face`, found next to the face's
    /// lower corner; `None` on the boundary.
    ///
    /// If the neighbour is coarser it covers the whole face.
    pub fn neighbor(&self, cell: usize, face: Face) -> Option<usize> {
        let key = self.cells[cell].key;
        let (r0, r1) = (key.r0() as i64, key.r1() as i64);
        let (t0, t1) = (key.t0() as i64, key.t1() as i64);
        match face {
            Face::RadialLow => self.locate(r0 - 1, t0 + 1),
            Face::RadialHigh => self.locate(r1 + 1, t0 + 1),
            Face::AngularLow => self.locate(r0 + 1, t0 - 1),
            Face::AngularHigh => self.locate(r0 + 1, t1 + 1),
        }
    }

    /// Boundary id of `face`, or `None` for interior faces.
    pub fn boundary_id(&self, cell: usize, face: Face) -> Option<BoundaryId> {
        let key = self.cells[cell].key;
        match face {
            Face::RadialLow if key.r0() == 0 => Some(0),
            Face::RadialHigh if key.r1() == SIDE => Some(if self.colorize { 1 } else { 0 }),
            _ => None,
        }
    }

    /// Physical position of a lattice point (fractional lattice units allowed).
    pub fn lattice_point(&self, r: f64, t: f64) -> [f64; 2] {
        let radius =
            self.inner_radius + (self.outer_radius - self.inner_radius) * r / SIDE as f64;
        let angle = 2.0 * std::f64::consts::PI * t / self.angular_period() as f64;
        let manifold = self
            .manifold
            .map(|(_, m)| m)
            .unwrap_or_else(|| SphericalManifold::new([0.0, 0.0]));
        manifold.push_forward(radius, angle)
    }

    /// Cell vertices counter-clockwise: `(r0,t0), (r1,t0), (r1,t1), (r0,t1)`.
    pub fn vertices(&self, cell: usize) -> [[f64; 2]; 4] {
        let key = self.cells[cell].key;
        let (r0, r1) = (key.r0() as f64, key.r1() as f64);
        let (t0, t1) = (key.t0() as f64, key.t1() as f64);
        [
            self.lattice_point(r0, t0),
            self.lattice_point(r1, t0),
            self.lattice_point(r1, t1),
            self.lattice_point(r0, t1),
        ]
    }

    /// Symmetric point adjacency: cells sharing at least one point with each cell.
    pub fn point_neighbors(&self) -> Vec<Vec<usize>> {
        let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); self.cells.len()];
        for (idx, cell) in self.cells.iter().enumerate() {
            let key = cell.key;
            let corners = [
                (key.r0(), key.t0()),
                (key.r1(), key.t0()),
                (key.r1(), key.t1()),
                (key.r0(), key.t1()),
            ];
            for (r, t) in corners {
                for (dr, dt) in [(-1i64, -1i64), (1, -1), (1, 1), (-1, 1)] {
                    if let Some(other) = self.locate(r as i64 + dr, t as i64 + dt) {
                        if other != idx {
                            adjacency[idx].push(other);
                            adjacency[other].push(idx);
                        }
                    }
                }
            }
        }
        adjacency
            .into_iter()
            .map(|list| list.into_iter().sorted_unstable().dedup().collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell() -> ShellMesh {
        let mut mesh = ShellMesh::hyper_shell(1.0, 2.0, 8, false).unwrap();
        mesh.set_manifold(0, SphericalManifold::new([0.0, 0.0]));
        mesh.set_all_manifold_ids(0);
        mesh
    }

    #[test]
    fn global_refinement_counts() {
        let mut mesh = shell();
        mesh.refine_global(2).unwrap();
        assert_eq!(mesh.n_active_cells(), 8 * 16);
        assert_eq!(mesh.max_level(), 2);
    }

    #[test]
    fn refinement_without_manifold_is_rejected() {
        let mut mesh = ShellMesh::hyper_shell(1.0, 2.0, 8, false).unwrap();
        assert!(matches!(mesh.refine_global(1), Err(CdrError::Mesh(_))));
    }

    #[test]
    fn refined_vertices_lie_on_circles() {
        let mut mesh = shell();
        mesh.refine_global(3).unwrap();
        for c in 0..mesh.n_active_cells() {
            let key = mesh.cell(c).key;
            let v = mesh.vertices(c);
            if key.r0() == 0 {
                for p in [v[0], v[3]] {
                    assert!((p[0].hypot(p[1]) - 1.0).abs() < 1e-12);
                }
            }
            if key.r1() == SIDE {
                for p in [v[1], v[2]] {
                    assert!((p[0].hypot(p[1]) - 2.0).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn child_vertex_is_manifold_midpoint() {
        let mut mesh = shell();
        let coarse = mesh.vertices(0);
        mesh.refine_global(1).unwrap();
        let m = SphericalManifold::new([0.0, 0.0]);
        let expected = m.intermediate_point(coarse[0], coarse[3], 0.5);
        let child = mesh.locate(1, 1).unwrap();
        let got = mesh.vertices(child)[3];
        assert!((got[0] - expected[0]).abs() < 1e-12);
        assert!((got[1] - expected[1]).abs() < 1e-12);
    }

    #[test]
    fn neighbors_wrap_around_the_circle() {
        let mesh = shell();
        let first = mesh.locate(1, 1).unwrap();
        let last = mesh.neighbor(first, Face::AngularLow).unwrap();
        assert_eq!(mesh.cell(last).key.coarse, 7);
        assert_eq!(mesh.neighbor(first, Face::RadialLow), None);
        assert_eq!(mesh.boundary_id(first, Face::RadialHigh), Some(0));
    }

    #[test]
    fn colorized_outer_boundary() {
        let mesh = ShellMesh::hyper_shell(1.0, 2.0, 6, true).unwrap();
        assert_eq!(mesh.boundary_id(0, Face::RadialLow), Some(0));
        assert_eq!(mesh.boundary_id(0, Face::RadialHigh), Some(1));
        assert_eq!(mesh.boundary_id(0, Face::AngularHigh), None);
    }

    #[test]
    fn locally_refined_neighbour_is_coarser() {
        let mut mesh = shell();
        mesh.refine_where(|m, c| m.cell(c).key.coarse == 0).unwrap();
        assert_eq!(mesh.n_active_cells(), 7 + 4);
        let fine = mesh.locate(1, (SIDE - 1) as i64).unwrap();
        let across = mesh.neighbor(fine, Face::AngularHigh).unwrap();
        assert_eq!(mesh.cell(across).key.level, 0);
        let adjacency = mesh.point_neighbors();
        assert!(adjacency[across].contains(&fine));
        assert!(adjacency[fine].contains(&across));
    }
}
