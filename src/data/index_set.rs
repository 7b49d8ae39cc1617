//! Sorted sets of global indices.

use itertools::Itertools;
use std::ops::Range;

/// A sorted, duplicate-free set of global indices.
///
/// Positions inside the set (`index_within_set`) give the local storage slot
/// used by ghosted vectors.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct IndexSet {
    indices: Vec<usize>,
}

impl IndexSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_range(range: Range<usize>) -> Self {
        Self {
            indices: range.collect(),
        }
    }

    /// Collect arbitrary indices; duplicates are removed.
    pub fn from_iter_unsorted<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().sorted_unstable().dedup().collect(),
        }
    }

    /// Add indices, keeping the set sorted.
    pub fn extend<I: IntoIterator<Item = usize>>(&mut self, iter: I) {
        let incoming: Vec<usize> = iter.into_iter().sorted_unstable().dedup().collect();
        self.indices = self
            .indices
            .iter()
            .copied()
            .merge(incoming)
            .dedup()
            .collect();
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        self.indices.binary_search(&index).is_ok()
    }

    /// Position of `index` inside the set.
    #[inline]
    pub fn index_within_set(&self, index: usize) -> Option<usize> {
        self.indices.binary_search(&index).ok()
    }

    /// Global index stored at position `pos`.
    #[inline]
    pub fn nth(&self, pos: usize) -> usize {
        self.indices[pos]
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    /// Whether every index of `self` is in `other`.
    pub fn is_subset_of(&self, other: &IndexSet) -> bool {
        self.iter().all(|i| other.contains(i))
    }
}

impl FromIterator<usize> for IndexSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_iter_unsorted(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_merges_and_dedups() {
        let mut set = IndexSet::from_iter_unsorted([5, 1, 3, 1]);
        set.extend([4, 3, 9]);
        assert_eq!(set.as_slice(), &[1, 3, 4, 5, 9]);
        assert_eq!(set.index_within_set(4), Some(2));
        assert_eq!(set.index_within_set(2), None);
        assert!(IndexSet::from_range(3..5).is_subset_of(&set));
    }
}
