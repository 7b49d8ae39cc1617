//! Ownership of degrees of freedom across ranks.
//!
//! After renumbering every rank owns one contiguous range of global DoF
//! indices, rank 0 first. [`DofPartition`] records those ranges for the whole
//! group together with the calling rank's *relevant* set: owned DoFs plus the
//! read-only halo needed for assembly and constraint evaluation.

use crate::cdr_error::CdrError;
use crate::data::index_set::IndexSet;
use std::ops::Range;

/// Rank whose range in `owned_ranges` (contiguous, rank order) contains `dof`.
pub fn rank_owning(owned_ranges: &[Range<usize>], dof: usize) -> Result<usize, CdrError> {
    if dof >= owned_ranges.last().map_or(0, |r| r.end) {
        return Err(CdrError::IndexNotInSet {
            index: dof,
            set: "global dofs",
        });
    }
    // empty ranges share their start with the next rank; take the last match
    Ok(owned_ranges.partition_point(|r| r.start <= dof) - 1)
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DofPartition {
    rank: usize,
    owned_ranges: Vec<Range<usize>>,
    relevant: IndexSet,
}

impl DofPartition {
    /// Build the partition seen by `rank`.
    ///
    /// `owned_ranges` must tile `0..n_dofs` in rank order and `relevant` must
    /// contain the rank's owned range.
    pub fn new(
        rank: usize,
        owned_ranges: Vec<Range<usize>>,
        relevant: IndexSet,
    ) -> Result<Self, CdrError> {
        let mut next = 0;
        for (r, range) in owned_ranges.iter().enumerate() {
            if range.start != next || range.end < range.start {
                return Err(CdrError::Mesh(format!(
                    "owned range of rank {r} ({range:?}) does not continue at {next}"
                )));
            }
            next = range.end;
        }
        let mine = owned_ranges.get(rank).cloned().ok_or_else(|| {
            CdrError::Mesh(format!(
                "rank {rank} outside group of {}",
                owned_ranges.len()
            ))
        })?;
        if let Some(missing) = mine.clone().find(|&dof| !relevant.contains(dof)) {
            return Err(CdrError::IndexNotInSet {
                index: missing,
                set: "relevant",
            });
        }
        Ok(Self {
            rank,
            owned_ranges,
            relevant,
        })
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn n_ranks(&self) -> usize {
        self.owned_ranges.len()
    }

    pub fn n_dofs(&self) -> usize {
        self.owned_ranges.last().map_or(0, |r| r.end)
    }

    /// Owned range of the calling rank.
    pub fn owned_range(&self) -> Range<usize> {
        self.owned_ranges[self.rank].clone()
    }

    /// Owned range of any rank.
    pub fn owned_range_of(&self, rank: usize) -> Range<usize> {
        self.owned_ranges[rank].clone()
    }

    pub fn owned_ranges(&self) -> &[Range<usize>] {
        &self.owned_ranges
    }

    pub fn n_owned(&self) -> usize {
        self.owned_range().len()
    }

    pub fn locally_owned(&self) -> IndexSet {
        IndexSet::from_range(self.owned_range())
    }

    pub fn relevant(&self) -> &IndexSet {
        &self.relevant
    }

    #[inline]
    pub fn is_owned(&self, dof: usize) -> bool {
        self.owned_range().contains(&dof)
    }

    /// Rank owning `dof`.
    pub fn owner_of(&self, dof: usize) -> Result<usize, CdrError> {
        rank_owning(&self.owned_ranges, dof)
    }

    /// Relevant DoFs owned by other ranks, ascending.
    pub fn ghosts(&self) -> impl Iterator<Item = usize> + '_ {
        let owned = self.owned_range();
        self.relevant.iter().filter(move |d| !owned.contains(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition() -> DofPartition {
        let relevant = IndexSet::from_iter_unsorted([2, 3, 4, 5, 6, 9]);
        DofPartition::new(1, vec![0..3, 3..7, 7..7, 7..10], relevant).unwrap()
    }

    #[test]
    fn owner_lookup_skips_empty_ranges() {
        let p = partition();
        assert_eq!(p.owner_of(0).unwrap(), 0);
        assert_eq!(p.owner_of(6).unwrap(), 1);
        assert_eq!(p.owner_of(7).unwrap(), 3);
        assert!(p.owner_of(10).is_err());
        assert_eq!(p.n_dofs(), 10);
    }

    #[test]
    fn ghosts_exclude_owned() {
        let p = partition();
        assert_eq!(p.ghosts().collect::<Vec<_>>(), vec![2, 9]);
        assert_eq!(p.n_owned(), 4);
    }

    #[test]
    fn gaps_are_rejected() {
        let relevant = IndexSet::from_range(0..3);
        assert!(DofPartition::new(0, vec![0..3, 4..6], relevant).is_err());
    }
}
