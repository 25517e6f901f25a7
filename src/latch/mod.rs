//! The trigger latch.
//!
//! [`Latch`] combines the lock-free [`LatchCell`] with the durable [`Store`]
//! it is seeded from and flushed to. There is one `Latch` per process, owned
//! by `main` and shared as `Arc<Latch>` with the edge source, the flusher and
//! the HTTP surface.
//!
//! # Contexts
//!
//! - [`Latch::record_edge`] and [`Latch::read`] are wait-free apart from a
//!   compare-and-swap retry, and never block or allocate.
//! - [`Latch::flush`] and [`Latch::reset`] call the store and may block on
//!   it. They run on blocking-capable threads.
//!
//! # Persistence Gate
//!
//! Every store write and the matching `dirty` confirmation happen while
//! holding `gate`. That serializes writes, so the value last committed is
//! always the value whose snapshot was confirmed. The flusher waits for the
//! gate; a reset only tries it and returns [`PersistError::Busy`] when a
//! flush is in progress, leaving the pending write to the next flush.

mod cell;

use std::fmt;
use std::sync::{Mutex, PoisonError, TryLockError};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::persistence::{Store, StoreError};

pub use cell::{LatchCell, LatchState};

/// Errors returned when a latch value could not be made durable.
///
/// In every case the in-memory value is already updated and `dirty` stays
/// set, so the flusher retries.
#[derive(Debug, Error)]
pub enum PersistError {
    /// Another persist was in progress; the write is deferred.
    #[error("persistence busy, write deferred to the next flush")]
    Busy,

    /// The store rejected the write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Clean,

    /// `triggered` was committed and the latch is clean.
    Persisted { triggered: bool },

    /// `triggered` was committed but the latch changed during the write, so
    /// it is still dirty.
    Superseded { triggered: bool },
}

/// Process-wide trigger latch backed by a durable store.
pub struct Latch {
    cell: LatchCell,
    store: Box<dyn Store>,
    gate: Mutex<()>,
}

impl fmt::Debug for Latch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Latch")
            .field("state", &self.cell.load())
            .finish_non_exhaustive()
    }
}

impl Latch {
    /// Creates the latch, seeded from the last committed value in `store`.
    ///
    /// A stored `true` starts the latch triggered and clean, since that value
    /// is already durable. A missing value, a stored `false` or a load error
    /// all start the latch idle; a load error is logged, not returned.
    pub fn seed(store: impl Store + 'static) -> Self {
        let seeded = match store.load() {
            Ok(Some(triggered)) => triggered,
            Ok(None) => {
                debug!("No stored latch value, starting idle");
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to load stored latch value, starting idle");
                false
            }
        };

        info!(triggered = seeded, "Latch seeded");

        Latch {
            cell: LatchCell::seeded(seeded),
            store: Box::new(store),
            gate: Mutex::new(()),
        }
    }

    /// Records an edge event.
    ///
    /// Never blocks, allocates or fails. Returns `true` if this call latched
    /// the trigger, `false` if it was already latched.
    #[inline]
    pub fn record_edge(&self) -> bool {
        self.cell.record_edge()
    }

    /// Returns whether the trigger is latched.
    #[inline]
    pub fn read(&self) -> bool {
        self.cell.triggered()
    }

    /// Returns both flags from a single observation.
    pub fn state(&self) -> LatchState {
        self.cell.load()
    }

    /// Clears the trigger and persists `false` before returning.
    ///
    /// The in-memory value is cleared first and stays cleared whatever the
    /// outcome. On error the latch stays dirty and the next flush retries
    /// the write. Resetting an idle latch whose `false` is already durable
    /// performs no write.
    pub fn reset(&self) -> Result<(), PersistError> {
        let prev = self.cell.clear();
        if prev == LatchState::IDLE {
            debug!("Reset on idle latch, stored value already false");
            return Ok(());
        }

        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return Err(PersistError::Busy),
        };

        match self.persist_locked()? {
            FlushOutcome::Persisted { .. } | FlushOutcome::Clean => {}
            FlushOutcome::Superseded { .. } => {
                debug!("Latch changed during reset persist, left for the flusher");
            }
        }
        Ok(())
    }

    /// Persists the current value if it is dirty.
    ///
    /// Waits for any in-progress persist. Idempotent: flushing a clean latch
    /// does nothing.
    pub fn flush(&self) -> Result<FlushOutcome, PersistError> {
        let _guard = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        self.persist_locked()
    }

    /// Writes the current snapshot and confirms it. Callers hold `gate`.
    fn persist_locked(&self) -> Result<FlushOutcome, PersistError> {
        let snapshot = self.cell.load();
        if !snapshot.dirty {
            return Ok(FlushOutcome::Clean);
        }

        self.store.save(snapshot.triggered)?;

        if self.cell.confirm(snapshot) {
            Ok(FlushOutcome::Persisted {
                triggered: snapshot.triggered,
            })
        } else {
            Ok(FlushOutcome::Superseded {
                triggered: snapshot.triggered,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use proptest::prelude::*;

    use super::*;
    use crate::persistence::MemoryStore;
    use crate::test_utils::{FlakyStore, LatchOp, arb_latch_ops};

    // ─── Seeding ───

    #[test]
    fn seed_from_empty_store_is_idle() {
        let latch = Latch::seed(MemoryStore::new());
        assert_eq!(latch.state(), LatchState::IDLE);
    }

    #[test]
    fn seed_from_stored_true_is_latched_and_clean() {
        let latch = Latch::seed(MemoryStore::with_value(true));
        assert_eq!(
            latch.state(),
            LatchState {
                triggered: true,
                dirty: false
            }
        );
    }

    #[test]
    fn seed_from_stored_false_is_idle() {
        let latch = Latch::seed(MemoryStore::with_value(false));
        assert_eq!(latch.state(), LatchState::IDLE);
    }

    #[test]
    fn seed_load_failure_is_idle() {
        let store = FlakyStore::new();
        store.inner().save(true).unwrap();
        store.fail_loads(true);

        let latch = Latch::seed(store);

        assert_eq!(latch.state(), LatchState::IDLE);
    }

    // ─── Edges ───

    #[test]
    fn record_edge_latches_without_touching_the_store() {
        let store = FlakyStore::new();
        let latch = Latch::seed(store.clone());

        assert!(latch.record_edge());

        assert!(latch.read());
        assert!(latch.state().dirty);
        assert_eq!(store.save_attempts(), 0);
    }

    #[test]
    fn repeated_edges_after_flush_keep_latch_clean() {
        let latch = Latch::seed(MemoryStore::new());
        latch.record_edge();
        latch.flush().unwrap();

        for _ in 0..10 {
            assert!(!latch.record_edge());
        }

        assert_eq!(
            latch.state(),
            LatchState {
                triggered: true,
                dirty: false
            }
        );
    }

    // ─── Flush ───

    #[test]
    fn flush_persists_dirty_value_and_clears_dirty() {
        let store = MemoryStore::new();
        let latch = Latch::seed(store.clone());
        latch.record_edge();

        let outcome = latch.flush().unwrap();

        assert_eq!(outcome, FlushOutcome::Persisted { triggered: true });
        assert_eq!(store.peek(), Some(true));
        assert!(!latch.state().dirty);
    }

    #[test]
    fn flush_on_clean_latch_does_not_write() {
        let store = FlakyStore::new();
        let latch = Latch::seed(store.clone());

        assert_eq!(latch.flush().unwrap(), FlushOutcome::Clean);
        assert_eq!(store.save_attempts(), 0);
    }

    #[test]
    fn failed_flush_keeps_dirty_and_retry_succeeds() {
        let store = FlakyStore::new();
        let latch = Latch::seed(store.clone());
        latch.record_edge();
        store.fail_next_saves(1);

        assert!(matches!(latch.flush(), Err(PersistError::Store(_))));
        assert!(latch.state().dirty);

        assert_eq!(
            latch.flush().unwrap(),
            FlushOutcome::Persisted { triggered: true }
        );
        assert_eq!(store.inner().peek(), Some(true));
    }

    #[test]
    fn durability_round_trip_after_flush() {
        let store = MemoryStore::new();
        let latch = Latch::seed(store.clone());
        latch.record_edge();
        latch.flush().unwrap();
        drop(latch);

        let rebooted = Latch::seed(store);

        assert!(rebooted.read());
        assert!(!rebooted.state().dirty);
    }

    // ─── Reset ───

    #[test]
    fn reset_clears_and_persists_synchronously() {
        let store = MemoryStore::with_value(true);
        let latch = Latch::seed(store.clone());

        latch.reset().unwrap();

        assert!(!latch.read());
        assert!(!latch.state().dirty);
        assert_eq!(store.peek(), Some(false));
    }

    #[test]
    fn reset_on_idle_clean_latch_skips_the_write() {
        let store = FlakyStore::new();
        let latch = Latch::seed(store.clone());

        latch.reset().unwrap();

        assert_eq!(store.save_attempts(), 0);
        assert_eq!(latch.state(), LatchState::IDLE);
    }

    #[test]
    fn reset_with_failing_store_clears_memory_and_stays_dirty() {
        let store = FlakyStore::new();
        store.inner().save(true).unwrap();
        let latch = Latch::seed(store.clone());
        store.fail_next_saves(1);

        assert!(matches!(latch.reset(), Err(PersistError::Store(_))));

        assert!(!latch.read());
        assert!(latch.state().dirty);
        assert_eq!(store.inner().peek(), Some(true));
    }

    #[test]
    fn failed_reset_is_completed_by_next_flush() {
        let store = FlakyStore::new();
        store.inner().save(true).unwrap();
        let latch = Latch::seed(store.clone());
        store.fail_next_saves(1);
        let _ = latch.reset();

        assert_eq!(
            latch.flush().unwrap(),
            FlushOutcome::Persisted { triggered: false }
        );
        drop(latch);

        let rebooted = Latch::seed(store);
        assert!(!rebooted.read());
    }

    #[test]
    fn reset_fails_fast_when_gate_is_held() {
        let latch = Latch::seed(MemoryStore::with_value(true));

        let guard = latch.gate.lock().unwrap();
        let result = latch.reset();
        drop(guard);

        assert!(matches!(result, Err(PersistError::Busy)));
        assert!(!latch.read());
        assert!(latch.state().dirty);

        assert_eq!(
            latch.flush().unwrap(),
            FlushOutcome::Persisted { triggered: false }
        );
    }

    #[test]
    fn edge_after_reset_relatches() {
        let latch = Latch::seed(MemoryStore::new());
        latch.record_edge();
        latch.reset().unwrap();

        assert!(latch.record_edge());
        assert!(latch.read());
        assert!(latch.state().dirty);
    }

    // ─── Concurrency ───

    #[test]
    fn concurrent_edges_resets_and_flushes_converge() {
        const EDGE_THREADS: usize = 4;
        const RESET_THREADS: usize = 3;
        const ITERATIONS: usize = 2_000;

        let store = MemoryStore::new();
        let latch = Latch::seed(store.clone());
        let stop = AtomicBool::new(false);

        std::thread::scope(|s| {
            let flusher = s.spawn(|| {
                while !stop.load(Ordering::Relaxed) {
                    let _ = latch.flush();
                }
            });

            let mut workers = Vec::new();
            for _ in 0..EDGE_THREADS {
                workers.push(s.spawn(|| {
                    for _ in 0..ITERATIONS {
                        latch.record_edge();
                    }
                }));
            }
            for _ in 0..RESET_THREADS {
                workers.push(s.spawn(|| {
                    for _ in 0..ITERATIONS {
                        let _ = latch.reset();
                    }
                }));
            }
            for worker in workers {
                worker.join().unwrap();
            }

            stop.store(true, Ordering::Relaxed);
            flusher.join().unwrap();
        });

        // Quiescent: one flush makes memory and store agree.
        latch.flush().unwrap();
        let state = latch.state();
        assert!(!state.dirty);
        assert_eq!(store.peek().unwrap_or(false), state.triggered);

        // A final edge after the storm is always observed.
        latch.record_edge();
        assert!(latch.read());
    }

    // ─── Sequence properties ───

    proptest! {
        /// At quiescence `read()` reflects the last state-changing call, and a
        /// clean latch always agrees with the store.
        #[test]
        fn read_tracks_last_edge_or_reset(ops in arb_latch_ops()) {
            let store = FlakyStore::new();
            let latch = Latch::seed(store.clone());
            let mut expected = false;

            for op in ops {
                match op {
                    LatchOp::Edge => {
                        latch.record_edge();
                        expected = true;
                    }
                    LatchOp::Reset => {
                        let _ = latch.reset();
                        expected = false;
                    }
                    LatchOp::Flush => {
                        let _ = latch.flush();
                    }
                    LatchOp::FailNextSave => store.fail_next_saves(1),
                }

                let state = latch.state();
                prop_assert_eq!(state.triggered, expected);
                if !state.dirty {
                    prop_assert_eq!(store.inner().peek().unwrap_or(false), state.triggered);
                }
            }

            store.fail_next_saves(0);
            latch.flush().unwrap();
            prop_assert!(!latch.state().dirty);
            prop_assert_eq!(store.inner().peek().unwrap_or(false), expected);

            let rebooted = Latch::seed(store.inner());
            prop_assert_eq!(rebooted.read(), expected);
        }

        /// Edges on a latched, clean latch never raise `dirty`.
        #[test]
        fn edges_while_latched_are_idempotent(extra in 1usize..50) {
            let latch = Latch::seed(MemoryStore::with_value(true));
            for _ in 0..extra {
                prop_assert!(!latch.record_edge());
            }
            prop_assert_eq!(latch.state(), LatchState { triggered: true, dirty: false });
        }
    }
}
