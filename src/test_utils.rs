//! Shared test utilities and arbitrary generators for property-based testing.

use std::sync::{Arc, Mutex, mpsc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use proptest::prelude::*;

use crate::indicator::Indicator;
use crate::persistence::{MemoryStore, Store, StoreError};
use crate::supervisor::{Link, LinkError};

/// A store that fails on demand.
///
/// Clones share both the underlying value and the failure controls, so a
/// test can keep one handle while the latch owns another.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    controls: Arc<Controls>,
}

#[derive(Debug, Default)]
struct Controls {
    failing_saves: AtomicUsize,
    save_attempts: AtomicUsize,
    fail_loads: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The backing store, bypassing failure injection.
    pub fn inner(&self) -> MemoryStore {
        self.inner.clone()
    }

    /// Makes the next `n` saves fail. `0` clears pending failures.
    pub fn fail_next_saves(&self, n: usize) {
        self.controls.failing_saves.store(n, Ordering::SeqCst);
    }

    pub fn fail_loads(&self, fail: bool) {
        self.controls.fail_loads.store(fail, Ordering::SeqCst);
    }

    /// Number of saves attempted, including failed ones.
    pub fn save_attempts(&self) -> usize {
        self.controls.save_attempts.load(Ordering::SeqCst)
    }
}

impl Store for FlakyStore {
    fn load(&self) -> Result<Option<bool>, StoreError> {
        if self.controls.fail_loads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected load failure".into()));
        }
        self.inner.load()
    }

    fn save(&self, triggered: bool) -> Result<(), StoreError> {
        self.controls.save_attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .controls
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected save failure".into()));
        }
        self.inner.save(triggered)
    }
}

/// Indicator that records every value it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingIndicator {
    shown: Mutex<Vec<bool>>,
}

impl RecordingIndicator {
    pub fn shown(&self) -> Vec<bool> {
        self.shown.lock().unwrap().clone()
    }
}

impl Indicator for RecordingIndicator {
    fn show(&self, triggered: bool) {
        self.shown.lock().unwrap().push(triggered);
    }
}

/// Indicator whose every `show` blocks until released.
///
/// Each value sent on the paired sender releases one write. Dropping the
/// sender releases all pending and future writes.
#[derive(Debug)]
pub struct GatedIndicator {
    release: Mutex<mpsc::Receiver<()>>,
    entered: AtomicUsize,
    shown: Mutex<Vec<bool>>,
}

impl GatedIndicator {
    pub fn new() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let indicator = GatedIndicator {
            release: Mutex::new(rx),
            entered: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        };
        (indicator, tx)
    }

    /// Number of writes that have started, including blocked ones.
    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    /// Values whose writes completed.
    pub fn shown(&self) -> Vec<bool> {
        self.shown.lock().unwrap().clone()
    }
}

impl Indicator for GatedIndicator {
    fn show(&self, triggered: bool) {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.lock().unwrap().recv();
        self.shown.lock().unwrap().push(triggered);
    }
}

/// A link switched up or down by the test. Clones share the switch.
#[derive(Debug, Clone)]
pub struct SwitchLink {
    up: Arc<AtomicBool>,
}

impl SwitchLink {
    pub fn new(up: bool) -> Self {
        SwitchLink {
            up: Arc::new(AtomicBool::new(up)),
        }
    }

    pub fn set_up(&self, up: bool) {
        self.up.store(up, Ordering::SeqCst);
    }
}

impl Link for SwitchLink {
    async fn probe(&self) -> Result<(), LinkError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LinkError::Down {
                interface: "test0".to_string(),
                state: "down".to_string(),
            })
        }
    }
}

/// One step of a latch operation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchOp {
    Edge,
    Reset,
    Flush,
    FailNextSave,
}

pub fn arb_latch_op() -> impl Strategy<Value = LatchOp> {
    prop_oneof![
        3 => Just(LatchOp::Edge),
        2 => Just(LatchOp::Reset),
        2 => Just(LatchOp::Flush),
        1 => Just(LatchOp::FailNextSave),
    ]
}

pub fn arb_latch_ops() -> impl Strategy<Value = Vec<LatchOp>> {
    prop::collection::vec(arb_latch_op(), 0..64)
}
