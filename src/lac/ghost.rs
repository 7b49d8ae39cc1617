//! Owner-to-ghost value transfer.
//!
//! A [`GhostImporter`] is set up once (collectively) for a fixed list of
//! off-process indices. Every later [`GhostImporter::import`] ships the current
//! owned values to the ranks that asked for them. Nothing is refreshed
//! implicitly; callers import after each change of the owned values.

use crate::algs::communicator::Communicator;
use crate::algs::wire::{self, WireIndex, WireValue};
use crate::cdr_error::CdrError;
use crate::lac::vector::DistributedVector;
use crate::topology::ownership::rank_owning;
use std::ops::Range;

#[derive(Clone, Debug)]
pub struct GhostImporter {
    owned: Range<usize>,
    /// Off-process indices, ascending; import results are in this order.
    ghosts: Vec<usize>,
    /// `requests[r]`: indices owned here that rank `r` asked for.
    requests: Vec<Vec<usize>>,
}

impl GhostImporter {
    /// Collective: register the off-process `ghosts` this rank will read.
    pub fn new<C, I>(owned_ranges: &[Range<usize>], ghosts: I, comm: &C) -> Result<Self, CdrError>
    where
        C: Communicator + ?Sized,
        I: IntoIterator<Item = usize>,
    {
        let rank = comm.rank();
        let owned = owned_ranges
            .get(rank)
            .cloned()
            .ok_or(CdrError::RemoteFailure {
                rank,
                phase: "ghost setup",
            })?;
        let mut ghosts: Vec<usize> = ghosts
            .into_iter()
            .filter(|g| !owned.contains(g))
            .collect();
        ghosts.sort_unstable();
        ghosts.dedup();

        let mut outgoing: Vec<Vec<WireIndex>> = vec![Vec::new(); comm.size()];
        for &g in &ghosts {
            outgoing[rank_owning(owned_ranges, g)?].push(WireIndex::new(g));
        }
        let incoming = comm.exchange(
            outgoing
                .iter()
                .map(|list| wire::encode(wire::kind::GHOST_REQUEST, list))
                .collect(),
        )?;
        let requests = incoming
            .iter()
            .map(|bytes| {
                let list: Vec<WireIndex> = wire::decode(wire::kind::GHOST_REQUEST, bytes)?;
                list.iter()
                    .map(|w| {
                        let index = w.get();
                        if owned.contains(&index) {
                            Ok(index)
                        } else {
                            Err(CdrError::IndexNotInSet {
                                index,
                                set: "locally owned",
                            })
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            owned,
            ghosts,
            requests,
        })
    }

    pub fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }

    pub fn n_ghosts(&self) -> usize {
        self.ghosts.len()
    }

    /// Collective: current values of [`ghosts`](Self::ghosts), in that order.
    pub fn import<C>(&self, src: &DistributedVector, comm: &C) -> Result<Vec<f64>, CdrError>
    where
        C: Communicator + ?Sized,
    {
        if src.owned_range() != self.owned {
            return Err(CdrError::Wire(format!(
                "vector owns {:?}, importer was built for {:?}",
                src.owned_range(),
                self.owned
            )));
        }
        let outgoing = self
            .requests
            .iter()
            .map(|list| {
                let records: Vec<WireValue> = list
                    .iter()
                    .map(|&i| WireValue::new(i, src.as_slice()[i - self.owned.start]))
                    .collect();
                wire::encode(wire::kind::GHOST_VALUES, &records)
            })
            .collect();
        let incoming = comm.exchange(outgoing)?;
        let mut values = vec![0.0; self.ghosts.len()];
        for bytes in &incoming {
            let records: Vec<WireValue> = wire::decode(wire::kind::GHOST_VALUES, bytes)?;
            for r in records {
                let pos = self
                    .ghosts
                    .binary_search(&r.index())
                    .map_err(|_| CdrError::IndexNotInSet {
                        index: r.index(),
                        set: "ghosts",
                    })?;
                values[pos] = r.value();
            }
        }
        Ok(values)
    }
}
