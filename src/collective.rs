//! Worker coordination primitives.
//!
//! The pipeline runs on a fixed-size pool of workers with statically
//! partitioned ownership. All coordination goes through two collective
//! operations: a barrier (all wait for all) and a gather (every worker sends
//! its local tile to the coordinator, rank 0). Both are whole-group and
//! blocking; there is no partial-failure recovery. A worker that fails
//! poisons the channel so the remaining workers error out of their
//! collective calls instead of blocking forever, and the job as a whole
//! aborts.

use crate::types::{CcError, CcResult, VolumeTile};
use std::sync::{Arc, Condvar, Mutex};

/// Injected collective transport. Implementable over threads, message
/// passing, or a multi-process runtime; the in-process implementation is
/// [`ThreadCollective`].
pub trait CollectiveChannel: Send + Sync {
    /// Block until every participant has called `barrier`.
    fn barrier(&self) -> CcResult<()>;

    /// Send `tile` to the coordinator. Returns the tiles of all ranks, in
    /// rank order, on rank 0 and `None` on every other rank.
    fn gather(&self, rank: usize, tile: VolumeTile) -> CcResult<Option<Vec<VolumeTile>>>;

    /// Mark the whole job as failed; wakes every blocked participant.
    fn poison(&self, reason: &str);
}

/// Per-worker capability: rank, pool size, and the collective channel.
/// Passed by value into each component; nothing reads ambient global state.
#[derive(Clone)]
pub struct WorkerContext {
    pub rank: usize,
    pub size: usize,
    channel: Arc<dyn CollectiveChannel>,
}

impl WorkerContext {
    pub fn new(rank: usize, size: usize, channel: Arc<dyn CollectiveChannel>) -> Self {
        Self { rank, size, channel }
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }

    pub fn barrier(&self) -> CcResult<()> {
        self.channel.barrier()
    }

    pub fn gather(&self, tile: VolumeTile) -> CcResult<Option<Vec<VolumeTile>>> {
        self.channel.gather(self.rank, tile)
    }

    pub fn poison(&self, reason: &str) {
        self.channel.poison(reason);
    }
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

struct BarrierState {
    arrived: usize,
    generation: u64,
    poisoned: Option<String>,
}

/// In-process collective channel over `size` threads: a generation-counting
/// barrier plus per-rank deposit slots for the gather.
pub struct ThreadCollective {
    size: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
    slots: Mutex<Vec<Option<VolumeTile>>>,
}

impl ThreadCollective {
    /// Create one context per rank, all sharing a single channel.
    pub fn create(size: usize) -> CcResult<Vec<WorkerContext>> {
        if size == 0 {
            return Err(CcError::Config("worker count must be positive".to_string()));
        }
        let channel: Arc<dyn CollectiveChannel> = Arc::new(Self {
            size,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                poisoned: None,
            }),
            cvar: Condvar::new(),
            slots: Mutex::new((0..size).map(|_| None).collect()),
        });
        Ok((0..size)
            .map(|rank| WorkerContext::new(rank, size, channel.clone()))
            .collect())
    }
}

impl CollectiveChannel for ThreadCollective {
    fn barrier(&self) -> CcResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(reason) = &state.poisoned {
            return Err(CcError::Collective(reason.clone()));
        }
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return Ok(());
        }
        let generation = state.generation;
        while state.generation == generation && state.poisoned.is_none() {
            state = self.cvar.wait(state).unwrap();
        }
        match &state.poisoned {
            Some(reason) => Err(CcError::Collective(reason.clone())),
            None => Ok(()),
        }
    }

    fn gather(&self, rank: usize, tile: VolumeTile) -> CcResult<Option<Vec<VolumeTile>>> {
        {
            let mut slots = self.slots.lock().unwrap();
            slots[rank] = Some(tile);
        }
        self.barrier()?;
        if rank == 0 {
            let tiles = {
                let mut slots = self.slots.lock().unwrap();
                slots
                    .iter_mut()
                    .map(Option::take)
                    .collect::<Option<Vec<VolumeTile>>>()
            }
            .ok_or_else(|| CcError::Collective("gather slot left empty".to_string()))?;
            self.barrier()?;
            Ok(Some(tiles))
        } else {
            self.barrier()?;
            Ok(None)
        }
    }

    fn poison(&self, reason: &str) {
        let mut state = self.state.lock().unwrap();
        if state.poisoned.is_none() {
            state.poisoned = Some(reason.to_string());
        }
        self.cvar.notify_all();
    }
}

/// Run `body` on `size` workers, one thread per rank. Any worker error
/// poisons the channel, so the remaining workers abort out of their next
/// collective call; the first error observed is returned.
pub fn run_workers<F>(size: usize, body: F) -> CcResult<()>
where
    F: Fn(WorkerContext) -> CcResult<()> + Send + Sync,
{
    let contexts = ThreadCollective::create(size)?;
    let body = &body;
    let results: Vec<CcResult<()>> = std::thread::scope(|scope| {
        let handles: Vec<_> = contexts
            .into_iter()
            .map(|ctx| {
                scope.spawn(move || {
                    let guard = ctx.clone();
                    let result =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| body(ctx)))
                            .unwrap_or_else(|_| {
                                Err(CcError::Collective("worker panicked".to_string()))
                            });
                    if let Err(e) = &result {
                        log::error!("worker {} failed: {}", guard.rank, e);
                        guard.poison(&e.to_string());
                    }
                    result
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Report the root cause, not the cascade of poisoned collectives
    let mut first_collective = None;
    for result in results {
        match result {
            Err(CcError::Collective(r)) if first_collective.is_none() => {
                first_collective = Some(CcError::Collective(r));
            }
            Err(e) => return Err(e),
            _ => {}
        }
    }
    match first_collective {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_barrier_synchronizes_all_ranks() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let counter = AtomicUsize::new(0);
        run_workers(4, |ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            ctx.barrier()?;
            // Everybody arrived before anybody proceeded
            assert_eq!(counter.load(Ordering::SeqCst), 4);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_gather_returns_rank_ordered_tiles_on_root() {
        run_workers(3, |ctx| {
            let tile = Array3::from_elem((1, 1, 2), ctx.rank as f32);
            let gathered = ctx.gather(tile)?;
            if ctx.is_coordinator() {
                let tiles = gathered.expect("root receives tiles");
                assert_eq!(tiles.len(), 3);
                for (rank, tile) in tiles.iter().enumerate() {
                    assert_eq!(tile[[0, 0, 0]], rank as f32);
                }
            } else {
                assert!(gathered.is_none());
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_repeated_gathers_reuse_slots() {
        run_workers(2, |ctx| {
            for round in 0..3 {
                let tile = Array3::from_elem((1, 1, 1), (ctx.rank * 10 + round) as f32);
                if let Some(tiles) = ctx.gather(tile)? {
                    assert_eq!(tiles[0][[0, 0, 0]], round as f32);
                    assert_eq!(tiles[1][[0, 0, 0]], (10 + round) as f32);
                }
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_failing_worker_poisons_the_job() {
        let err = run_workers(3, |ctx| {
            if ctx.rank == 1 {
                return Err(CcError::Processing("bad trace".to_string()));
            }
            // Ranks 0 and 2 would block here forever without poisoning
            ctx.barrier()?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, CcError::Processing(_)));
    }

    #[test]
    fn test_single_worker_collectives_are_trivial() {
        run_workers(1, |ctx| {
            ctx.barrier()?;
            let tiles = ctx.gather(Array3::zeros((1, 1, 1)))?.unwrap();
            assert_eq!(tiles.len(), 1);
            Ok(())
        })
        .unwrap();
    }
}
