//! Partitioning of the shell mesh and its DoFs across ranks.
//!
//! Cells are split into contiguous chunks of the space-filling-curve order,
//! so each rank gets a compact patch. Ghost cells are the non-owned cells
//! touching an owned cell. DoF ownership follows from cell ownership (see
//! [`DofHandler::distribute`]), and the relevant set of a rank is every DoF on
//! its owned and ghost cells plus the columns their constraint lines use.

use crate::cdr_error::CdrError;
use crate::data::constraints::AffineConstraints;
use crate::data::dof_handler::DofHandler;
use crate::data::index_set::IndexSet;
use crate::topology::ownership::DofPartition;
use crate::topology::shell::ShellMesh;
use std::ops::Range;

/// The `rank`-th of `n_ranks` balanced contiguous chunks of `0..n`.
pub fn chunk(n: usize, n_ranks: usize, rank: usize) -> Range<usize> {
    (rank * n / n_ranks)..((rank + 1) * n / n_ranks)
}

/// Cell ownership as seen from one rank.
#[derive(Clone, Debug)]
pub struct CellPartition {
    rank: usize,
    n_ranks: usize,
    owners: Vec<usize>,
    ghosts: Vec<usize>,
}

impl CellPartition {
    pub fn new(mesh: &ShellMesh, rank: usize, n_ranks: usize) -> Result<Self, CdrError> {
        if n_ranks == 0 || rank >= n_ranks {
            return Err(CdrError::InvalidParameter {
                name: "rank",
                reason: format!("rank {rank} outside a group of {n_ranks}"),
            });
        }
        let n = mesh.n_active_cells();
        let mut owners = vec![0; n];
        for r in 0..n_ranks {
            for cell in chunk(n, n_ranks, r) {
                owners[cell] = r;
            }
        }
        let adjacency = mesh.point_neighbors();
        let mut ghosts: Vec<usize> = chunk(n, n_ranks, rank)
            .flat_map(|cell| adjacency[cell].iter().copied())
            .filter(|&other| owners[other] != rank)
            .collect();
        ghosts.sort_unstable();
        ghosts.dedup();
        log::debug!(
            "rank {rank}: {} owned cells, {} ghost cells",
            chunk(n, n_ranks, rank).len(),
            ghosts.len()
        );
        Ok(Self {
            rank,
            n_ranks,
            owners,
            ghosts,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.n_ranks
    }

    /// Owner of every active cell.
    pub fn owners(&self) -> &[usize] {
        &self.owners
    }

    pub fn owned_cells(&self) -> Range<usize> {
        chunk(self.owners.len(), self.n_ranks, self.rank)
    }

    pub fn ghost_cells(&self) -> &[usize] {
        &self.ghosts
    }

    pub fn is_owned(&self, cell: usize) -> bool {
        self.owners[cell] == self.rank
    }
}

/// DoFs whose values this rank must see: DoFs on owned and ghost cells plus
/// the columns of the constraint lines among them.
pub fn relevant_dofs(
    cells: &CellPartition,
    dofs: &DofHandler,
    constraints: &AffineConstraints,
) -> IndexSet {
    let mut relevant =
        dofs.dofs_on_cells(cells.owned_cells().chain(cells.ghost_cells().iter().copied()));
    let columns: Vec<usize> = constraints.columns_for(&relevant).collect();
    relevant.extend(columns);
    relevant
}

/// Assemble the [`DofPartition`] for this rank.
pub fn dof_partition(
    cells: &CellPartition,
    dofs: &DofHandler,
    constraints: &AffineConstraints,
) -> Result<DofPartition, CdrError> {
    let mut relevant = relevant_dofs(cells, dofs, constraints);
    let owned = dofs.owned_ranges()[cells.rank()].clone();
    relevant.extend(owned);
    DofPartition::new(cells.rank(), dofs.owned_ranges().to_vec(), relevant)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_tile_the_range() {
        for n in [0, 1, 7, 64] {
            for ranks in 1..5 {
                let total: usize = (0..ranks).map(|r| chunk(n, ranks, r).len()).sum();
                assert_eq!(total, n);
                assert_eq!(chunk(n, ranks, ranks - 1).end, n);
            }
        }
    }
}
