//! Distributed vectors: the owned view and the relevant (ghosted) view.
//!
//! A [`DistributedVector`] stores exactly the locally owned entries; it is the
//! only place they are written. A [`GhostedVector`] stores the relevant set
//! (owned plus halo) and is read-only apart from constraint distribution; its
//! ghost entries change only through [`GhostedVector::update_ghosts`].

use crate::algs::communicator::Communicator;
use crate::algs::wire::{self, WireScalar, WireValue};
use crate::cdr_error::CdrError;
use crate::data::constraints::ConstraintTarget;
use crate::data::index_set::IndexSet;
use crate::lac::ghost::GhostImporter;
use crate::topology::ownership::{DofPartition, rank_owning};
use std::collections::BTreeMap;
use std::ops::Range;

#[derive(Clone, Debug, PartialEq)]
pub struct DistributedVector {
    owned: Range<usize>,
    n_global: usize,
    values: Vec<f64>,
}

impl DistributedVector {
    pub fn new(owned: Range<usize>, n_global: usize) -> Self {
        let values = vec![0.0; owned.len()];
        Self {
            owned,
            n_global,
            values,
        }
    }

    pub fn from_partition(partition: &DofPartition) -> Self {
        Self::new(partition.owned_range(), partition.n_dofs())
    }

    /// A zero vector with the same layout.
    pub fn zeros_like(&self) -> Self {
        Self::new(self.owned.clone(), self.n_global)
    }

    pub fn owned_range(&self) -> Range<usize> {
        self.owned.clone()
    }

    pub fn n_global(&self) -> usize {
        self.n_global
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn get(&self, global: usize) -> Result<f64, CdrError> {
        self.values
            .get(global.wrapping_sub(self.owned.start))
            .copied()
            .ok_or(CdrError::IndexNotInSet {
                index: global,
                set: "locally owned",
            })
    }

    pub fn fill(&mut self, value: f64) {
        self.values.fill(value);
    }

    pub fn copy_from(&mut self, other: &DistributedVector) {
        debug_assert_eq!(self.owned, other.owned);
        self.values.copy_from_slice(&other.values);
    }

    /// `self += a * x`
    pub fn axpy(&mut self, a: f64, x: &DistributedVector) {
        for (y, x) in self.values.iter_mut().zip(&x.values) {
            *y += a * x;
        }
    }

    /// `self = s * self + a * x`
    pub fn sadd(&mut self, s: f64, a: f64, x: &DistributedVector) {
        for (y, x) in self.values.iter_mut().zip(&x.values) {
            *y = s * *y + a * x;
        }
    }

    pub fn scale(&mut self, a: f64) {
        for v in &mut self.values {
            *v *= a;
        }
    }

    pub fn local_dot(&self, other: &DistributedVector) -> f64 {
        self.values.iter().zip(&other.values).map(|(a, b)| a * b).sum()
    }

    /// Collective dot product.
    pub fn dot<C: Communicator + ?Sized>(
        &self,
        other: &DistributedVector,
        comm: &C,
    ) -> Result<f64, CdrError> {
        Ok(comm.allreduce_sum(&[self.local_dot(other)])?[0])
    }

    /// Collective Euclidean norm.
    pub fn l2_norm<C: Communicator + ?Sized>(&self, comm: &C) -> Result<f64, CdrError> {
        Ok(self.dot(self, comm)?.sqrt())
    }

    /// Collective maximum absolute entry.
    pub fn linfty_norm<C: Communicator + ?Sized>(&self, comm: &C) -> Result<f64, CdrError> {
        let local = self.values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let gathered = comm.all_gather(&wire::encode(
            wire::kind::SCALARS,
            &[WireScalar::new(local)],
        ))?;
        let mut max = 0.0f64;
        for bytes in &gathered {
            for s in wire::decode::<WireScalar>(wire::kind::SCALARS, bytes)? {
                max = max.max(s.get());
            }
        }
        Ok(max)
    }
}

impl ConstraintTarget for DistributedVector {
    fn holds(&self, index: usize) -> bool {
        self.owned.contains(&index)
    }

    fn value_at(&self, index: usize) -> Result<f64, CdrError> {
        self.get(index)
    }

    fn set_value(&mut self, index: usize, value: f64) -> Result<(), CdrError> {
        let start = self.owned.start;
        let slot = self
            .values
            .get_mut(index.wrapping_sub(start))
            .ok_or(CdrError::IndexNotInSet {
                index,
                set: "locally owned",
            })?;
        *slot = value;
        Ok(())
    }
}

/// Read-only copy of the relevant entries.
#[derive(Clone, Debug, PartialEq)]
pub struct GhostedVector {
    owned: Range<usize>,
    set: IndexSet,
    values: Vec<f64>,
}

impl GhostedVector {
    pub fn new(partition: &DofPartition) -> Self {
        let set = partition.relevant().clone();
        let values = vec![0.0; set.len()];
        Self {
            owned: partition.owned_range(),
            set,
            values,
        }
    }

    pub fn index_set(&self) -> &IndexSet {
        &self.set
    }

    pub fn get(&self, global: usize) -> Result<f64, CdrError> {
        self.set
            .index_within_set(global)
            .map(|pos| self.values[pos])
            .ok_or(CdrError::IndexNotInSet {
                index: global,
                set: "locally relevant",
            })
    }

    /// Values for a list of global indices, e.g. one cell's DoFs.
    pub fn extract(&self, globals: &[usize], out: &mut [f64]) -> Result<(), CdrError> {
        for (slot, &g) in out.iter_mut().zip(globals) {
            *slot = self.get(g)?;
        }
        Ok(())
    }

    /// Collective: copy the owned values of `src` and fetch the halo from the
    /// owners.
    pub fn update_ghosts<C: Communicator + ?Sized>(
        &mut self,
        src: &DistributedVector,
        importer: &GhostImporter,
        comm: &C,
    ) -> Result<(), CdrError> {
        let ghost_values = importer.import(src, comm)?;
        for (&g, &v) in importer.ghosts().iter().zip(&ghost_values) {
            if let Some(pos) = self.set.index_within_set(g) {
                self.values[pos] = v;
            }
        }
        for (pos, g) in self.set.iter().enumerate() {
            if self.owned.contains(&g) {
                self.values[pos] = src.as_slice()[g - self.owned.start];
            }
        }
        Ok(())
    }

    /// Write the owned entries back into `dst`.
    pub fn copy_owned_into(&self, dst: &mut DistributedVector) -> Result<(), CdrError> {
        for (pos, g) in self.set.iter().enumerate() {
            if self.owned.contains(&g) {
                dst.set_value(g, self.values[pos])?;
            }
        }
        Ok(())
    }
}

impl ConstraintTarget for GhostedVector {
    fn holds(&self, index: usize) -> bool {
        self.set.contains(index)
    }

    fn value_at(&self, index: usize) -> Result<f64, CdrError> {
        self.get(index)
    }

    fn set_value(&mut self, index: usize, value: f64) -> Result<(), CdrError> {
        let pos = self
            .set
            .index_within_set(index)
            .ok_or(CdrError::IndexNotInSet {
                index,
                set: "locally relevant",
            })?;
        self.values[pos] = value;
        Ok(())
    }
}

/// Accumulates contributions to any global entry; [`compress`](Self::compress)
/// ships the off-process ones to their owners.
#[derive(Clone, Debug)]
pub struct VectorBuilder {
    owned_ranges: Vec<Range<usize>>,
    rank: usize,
    local: Vec<f64>,
    remote: BTreeMap<usize, f64>,
}

impl VectorBuilder {
    pub fn new(partition: &DofPartition) -> Self {
        Self {
            owned_ranges: partition.owned_ranges().to_vec(),
            rank: partition.rank(),
            local: vec![0.0; partition.n_owned()],
            remote: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, global: usize, value: f64) {
        let owned = &self.owned_ranges[self.rank];
        if owned.contains(&global) {
            self.local[global - owned.start] += value;
        } else {
            *self.remote.entry(global).or_insert(0.0) += value;
        }
    }

    /// Collective: sum every contribution exactly once on its owner.
    pub fn compress<C: Communicator + ?Sized>(self, comm: &C) -> Result<DistributedVector, CdrError> {
        let mut outgoing: Vec<Vec<WireValue>> = vec![Vec::new(); comm.size()];
        for (&global, &value) in &self.remote {
            outgoing[rank_owning(&self.owned_ranges, global)?].push(WireValue::new(global, value));
        }
        let incoming = comm.exchange(
            outgoing
                .iter()
                .map(|records| wire::encode(wire::kind::VECTOR_ENTRIES, records))
                .collect(),
        )?;
        let owned = self.owned_ranges[self.rank].clone();
        let n_global = self.owned_ranges.last().map_or(0, |r| r.end);
        let mut out = DistributedVector {
            owned: owned.clone(),
            n_global,
            values: self.local,
        };
        for bytes in &incoming {
            for r in wire::decode::<WireValue>(wire::kind::VECTOR_ENTRIES, bytes)? {
                let index = r.index();
                if !owned.contains(&index) {
                    return Err(CdrError::IndexNotInSet {
                        index,
                        set: "locally owned",
                    });
                }
                out.values[index - owned.start] += r.value();
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, run_spmd};

    fn partition(rank: usize) -> DofPartition {
        let ranges = vec![0..3, 3..6];
        let relevant = if rank == 0 {
            IndexSet::from_iter_unsorted([0, 1, 2, 3])
        } else {
            IndexSet::from_iter_unsorted([2, 3, 4, 5])
        };
        DofPartition::new(rank, ranges, relevant).unwrap()
    }

    #[test]
    fn compress_sums_shared_entries_once() {
        let results = run_spmd(2, |comm| {
            let p = partition(comm.rank());
            let mut b = VectorBuilder::new(&p);
            // both ranks contribute to 2 and 3
            b.add(2, 1.0);
            b.add(3, 1.0);
            b.compress(&comm).unwrap().as_slice().to_vec()
        });
        assert_eq!(results[0], vec![0.0, 0.0, 2.0]);
        assert_eq!(results[1], vec![2.0, 0.0, 0.0]);
    }

    #[test]
    fn ghosts_follow_owners() {
        let results = run_spmd(2, |comm| {
            let p = partition(comm.rank());
            let importer = GhostImporter::new(p.owned_ranges(), p.ghosts(), &comm).unwrap();
            let mut owned = DistributedVector::from_partition(&p);
            for (k, v) in owned.as_mut_slice().iter_mut().enumerate() {
                *v = (p.owned_range().start + k) as f64 * 10.0;
            }
            let mut ghosted = GhostedVector::new(&p);
            ghosted.update_ghosts(&owned, &importer, &comm).unwrap();
            p.relevant()
                .iter()
                .map(|g| ghosted.get(g).unwrap())
                .collect::<Vec<_>>()
        });
        assert_eq!(results[0], vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(results[1], vec![20.0, 30.0, 40.0, 50.0]);
    }

    #[test]
    fn serial_norms() {
        let mut v = DistributedVector::new(0..3, 3);
        v.as_mut_slice().copy_from_slice(&[3.0, -4.0, 0.0]);
        assert_eq!(v.l2_norm(&NoComm).unwrap(), 5.0);
        assert_eq!(v.linfty_norm(&NoComm).unwrap(), 4.0);
        assert!(v.get(3).is_err());
    }
}
