//! Thin façade over in-process (threads) or inter-process (MPI) message passing.
//!
//! Every operation is collective: all ranks of a group call it in the same
//! order. Messages are contiguous byte buffers framed by [`crate::algs::wire`].
//! Reductions are summed in rank order on every rank, so all ranks see
//! bit-identical results and take identical control-flow decisions.

use crate::algs::wire::{self, WireScalar};
use crate::cdr_error::CdrError;
use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

/// Collective communication interface (minimal by design).
pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Block until every rank has arrived.
    fn barrier(&self) -> Result<(), CdrError>;

    /// Personalized all-to-all: `outgoing[dst]` is delivered to rank `dst`;
    /// the result holds what each source rank sent here, indexed by source.
    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Bytes>, CdrError>;

    /// Every rank's `data`, indexed by rank.
    fn all_gather(&self, data: &[u8]) -> Result<Vec<Bytes>, CdrError> {
        self.exchange(vec![data.to_vec(); self.size()])
    }

    /// Element-wise sum over ranks, accumulated in rank order.
    fn allreduce_sum(&self, values: &[f64]) -> Result<Vec<f64>, CdrError> {
        let records: Vec<WireScalar> = values.iter().map(|&v| WireScalar::new(v)).collect();
        let gathered = self.all_gather(&wire::encode(wire::kind::SCALARS, &records))?;
        let mut sum = vec![0.0; values.len()];
        for (src, bytes) in gathered.iter().enumerate() {
            let part: Vec<WireScalar> = wire::decode(wire::kind::SCALARS, bytes)?;
            if part.len() != values.len() {
                return Err(CdrError::Wire(format!(
                    "rank {src} reduced {} values, expected {}",
                    part.len(),
                    values.len()
                )));
            }
            for (acc, v) in sum.iter_mut().zip(&part) {
                *acc += v.get();
            }
        }
        Ok(sum)
    }

    /// Agree on success: the smallest rank that reported `ok == false`.
    fn first_failed_rank(&self, ok: bool) -> Result<Option<usize>, CdrError> {
        let gathered = self.all_gather(&[u8::from(ok)])?;
        Ok(gathered
            .iter()
            .position(|flag| flag.first().copied() != Some(1)))
    }
}

fn check_fanout(outgoing: &[Vec<u8>], size: usize) -> Result<(), CdrError> {
    if outgoing.len() == size {
        Ok(())
    } else {
        Err(CdrError::Wire(format!(
            "exchange needs {size} outgoing buffers, got {}",
            outgoing.len()
        )))
    }
}

/// Single-process communicator; collectives are no-ops.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), CdrError> {
        Ok(())
    }

    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Bytes>, CdrError> {
        check_fanout(&outgoing, 1)?;
        Ok(outgoing.into_iter().map(Bytes::from).collect())
    }
}

// --- LocalComm: ranks as threads of one process ---

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    /// First rank that left the group; every later wait fails.
    departed: Option<usize>,
}

/// Reusable barrier that a departing rank can break.
#[derive(Debug, Default)]
struct GroupBarrier {
    state: Mutex<BarrierState>,
    released: Condvar,
}

impl GroupBarrier {
    /// Wait for `size` ranks; `Err(rank)` if `rank` left the group instead.
    fn wait(&self, size: usize) -> Result<(), usize> {
        let mut state = self.state.lock();
        if let Some(rank) = state.departed {
            return Err(rank);
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }
        loop {
            self.released.wait(&mut state);
            // a completed round wins over a later departure
            if state.generation != generation {
                return Ok(());
            }
            if let Some(rank) = state.departed {
                return Err(rank);
            }
        }
    }

    fn depart(&self, rank: usize) {
        let mut state = self.state.lock();
        if state.departed.is_none() {
            state.departed = Some(rank);
        }
        self.released.notify_all();
    }
}

#[derive(Debug)]
struct Shared {
    size: usize,
    barrier: GroupBarrier,
    /// `slots[src * size + dst]`
    slots: Vec<Mutex<Option<Bytes>>>,
}

impl Shared {
    fn wait(&self, phase: &'static str) -> Result<(), CdrError> {
        self.barrier
            .wait(self.size)
            .map_err(|rank| CdrError::RemoteFailure { rank, phase })
    }
}

/// One rank of an in-process SPMD group.
#[derive(Clone, Debug)]
pub struct LocalComm {
    rank: usize,
    shared: Arc<Shared>,
}

impl LocalComm {
    /// Create the `size` ranks of a new group.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            size,
            barrier: GroupBarrier::default(),
            slots: (0..size * size).map(|_| Mutex::new(None)).collect(),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Leave the group. Ranks blocked in, or later entering, a collective
    /// get [`CdrError::RemoteFailure`] naming this rank.
    pub fn depart(&self) {
        self.shared.barrier.depart(self.rank);
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn barrier(&self) -> Result<(), CdrError> {
        self.shared.wait("barrier")
    }

    fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Bytes>, CdrError> {
        let size = self.shared.size;
        check_fanout(&outgoing, size)?;
        for (dst, buf) in outgoing.into_iter().enumerate() {
            *self.shared.slots[self.rank * size + dst].lock() = Some(Bytes::from(buf));
        }
        self.shared.wait("exchange")?;
        let incoming = (0..size)
            .map(|src| {
                self.shared.slots[src * size + self.rank]
                    .lock()
                    .take()
                    .ok_or(CdrError::RemoteFailure {
                        rank: src,
                        phase: "exchange",
                    })
            })
            .collect();
        // nobody refills a slot before every rank has drained its column
        self.shared.wait("exchange")?;
        incoming
    }
}

/// Marks its rank as departed when the rank body ends, by return or by panic.
struct Departure<'a>(&'a LocalComm);

impl Drop for Departure<'_> {
    fn drop(&mut self) {
        self.0.depart();
    }
}

/// Run `f` on every rank of a fresh `size`-rank [`LocalComm`] group, one
/// thread per rank, and return the per-rank results in rank order.
///
/// A rank that panics or returns leaves the group, so peers still waiting in
/// a collective fail with [`CdrError::RemoteFailure`] instead of blocking. A
/// panic is re-raised once every rank has finished.
pub fn run_spmd<F, R>(size: usize, f: F) -> Vec<R>
where
    F: Fn(LocalComm) -> R + Sync,
    R: Send,
{
    let comms = LocalComm::group(size);
    std::thread::scope(|scope| {
        let handles: Vec<_> = comms
            .into_iter()
            .map(|comm| {
                let f = &f;
                scope.spawn(move || {
                    let handle = comm.clone();
                    let _departure = Departure(&handle);
                    f(comm)
                })
            })
            .collect();
        let joined: Vec<_> = handles.into_iter().map(|h| h.join()).collect();
        joined
            .into_iter()
            .map(|result| match result {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    })
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Communicator, check_fanout};
    use crate::cdr_error::CdrError;
    use bytes::Bytes;
    use mpi::Count;
    use mpi::datatype::{Partition, PartitionMut};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator as _, CommunicatorCollectives as _};

    /// One process of an MPI job.
    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
    }

    impl MpiComm {
        /// Wrap a communicator, typically `universe.world()`.
        pub fn new(world: SimpleCommunicator) -> Self {
            let rank = world.rank() as usize;
            let size = world.size() as usize;
            Self { world, rank, size }
        }
    }

    impl Communicator for MpiComm {
        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn barrier(&self) -> Result<(), CdrError> {
            self.world.barrier();
            Ok(())
        }

        fn exchange(&self, outgoing: Vec<Vec<u8>>) -> Result<Vec<Bytes>, CdrError> {
            check_fanout(&outgoing, self.size)?;
            let send_counts: Vec<Count> = outgoing.iter().map(|b| b.len() as Count).collect();
            let mut recv_counts: Vec<Count> = vec![0; self.size];
            self.world.all_to_all_into(&send_counts[..], &mut recv_counts[..]);

            let displs = |counts: &[Count]| -> Vec<Count> {
                counts
                    .iter()
                    .scan(0, |acc, &c| {
                        let start = *acc;
                        *acc += c;
                        Some(start)
                    })
                    .collect()
            };
            let send_displs = displs(&send_counts);
            let recv_displs = displs(&recv_counts);
            let send_buf: Vec<u8> = outgoing.concat();
            let total: usize = recv_counts.iter().map(|&c| c as usize).sum();
            let mut recv_buf = vec![0u8; total];
            {
                let send = Partition::new(&send_buf[..], &send_counts[..], &send_displs[..]);
                let mut recv =
                    PartitionMut::new(&mut recv_buf[..], &recv_counts[..], &recv_displs[..]);
                self.world.all_to_all_varcount_into(&send, &mut recv);
            }
            let recv = Bytes::from(recv_buf);
            Ok(recv_displs
                .iter()
                .zip(&recv_counts)
                .map(|(&d, &c)| recv.slice(d as usize..(d + c) as usize))
                .collect())
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_exchange_is_personalized() {
        let received = run_spmd(3, |comm| {
            let out = (0..comm.size())
                .map(|dst| vec![(comm.rank() * 10 + dst) as u8])
                .collect();
            comm.exchange(out).unwrap()
        });
        for (rank, incoming) in received.iter().enumerate() {
            for (src, bytes) in incoming.iter().enumerate() {
                assert_eq!(bytes.as_ref(), &[(src * 10 + rank) as u8]);
            }
        }
    }

    #[test]
    fn allreduce_is_identical_everywhere() {
        let sums = run_spmd(4, |comm| {
            comm.allreduce_sum(&[0.1 * comm.rank() as f64, 1.0]).unwrap()
        });
        assert!(sums.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(sums[0][1], 4.0);
    }

    #[test]
    fn failure_is_agreed_on() {
        let agreed = run_spmd(3, |comm| comm.first_failed_rank(comm.rank() != 1).unwrap());
        assert_eq!(agreed, vec![Some(1); 3]);
        assert_eq!(NoComm.first_failed_rank(true).unwrap(), None);
    }

    #[test]
    fn returning_rank_breaks_the_barrier() {
        let results = run_spmd(3, |comm| {
            if comm.rank() == 1 {
                return Ok(());
            }
            comm.barrier()
        });
        assert!(results[1].is_ok());
        for rank in [0, 2] {
            assert!(matches!(
                results[rank],
                Err(CdrError::RemoteFailure { rank: 1, .. })
            ));
        }
    }

    #[test]
    fn panicking_rank_releases_its_peers() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let peer_failed = AtomicBool::new(false);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            run_spmd(2, |comm| {
                if comm.rank() == 0 {
                    panic!("rank 0 gives up");
                }
                if comm.exchange(vec![Vec::new(); 2]).is_err() {
                    peer_failed.store(true, Ordering::SeqCst);
                }
            })
        }));
        assert!(outcome.is_err());
        assert!(peer_failed.load(Ordering::SeqCst));
    }

    #[test]
    fn completed_rounds_survive_a_departure() {
        let results = run_spmd(4, |comm| {
            for _ in 0..5 {
                comm.allreduce_sum(&[1.0])?;
            }
            Ok::<_, CdrError>(())
        });
        assert!(results.iter().all(|r| r.is_ok()));
    }
}
