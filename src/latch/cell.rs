//! Lock-free storage for the `(triggered, dirty)` pair.
//!
//! Both flags live in one `AtomicU8`, so every observation of the pair comes
//! from a single load and no torn combination is ever visible. All mutations
//! are single compare-and-swap loops: they never block, never allocate and
//! never touch I/O, which makes [`LatchCell::record_edge`] safe to call from
//! a signal handler or an interrupt vector.
//!
//! `LatchCell::new` is `const`, so a platform whose interrupt callback cannot
//! carry a context pointer may place a cell in a `static` at that boundary.

use std::sync::atomic::{AtomicU8, Ordering};

const TRIGGERED: u8 = 0b01;
const DIRTY: u8 = 0b10;

/// A point-in-time view of the latch flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LatchState {
    /// The edge event has occurred since the last reset.
    pub triggered: bool,

    /// Memory differs from the last confirmed durable value.
    pub dirty: bool,
}

impl LatchState {
    /// Not triggered and nothing pending.
    pub const IDLE: LatchState = LatchState {
        triggered: false,
        dirty: false,
    };

    const fn from_bits(bits: u8) -> Self {
        LatchState {
            triggered: bits & TRIGGERED != 0,
            dirty: bits & DIRTY != 0,
        }
    }

    const fn bits(self) -> u8 {
        (if self.triggered { TRIGGERED } else { 0 }) | (if self.dirty { DIRTY } else { 0 })
    }
}

/// Atomic cell holding a [`LatchState`].
#[derive(Debug, Default)]
pub struct LatchCell {
    bits: AtomicU8,
}

impl LatchCell {
    /// Creates an idle cell.
    pub const fn new() -> Self {
        LatchCell {
            bits: AtomicU8::new(0),
        }
    }

    /// Creates a clean cell holding a value that is already durable.
    pub const fn seeded(triggered: bool) -> Self {
        LatchCell {
            bits: AtomicU8::new(if triggered { TRIGGERED } else { 0 }),
        }
    }

    /// Latches the cell.
    ///
    /// Returns `true` if this call performed the idle-to-latched transition.
    /// When the cell is already latched nothing is written, so `dirty` is
    /// never raised again for a value that is already durable.
    #[inline]
    pub fn record_edge(&self) -> bool {
        self.bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                if bits & TRIGGERED != 0 {
                    None
                } else {
                    Some(bits | TRIGGERED | DIRTY)
                }
            })
            .is_ok()
    }

    /// Returns both flags from one atomic load.
    #[inline]
    pub fn load(&self) -> LatchState {
        LatchState::from_bits(self.bits.load(Ordering::Acquire))
    }

    /// Returns the triggered flag.
    #[inline]
    pub fn triggered(&self) -> bool {
        self.load().triggered
    }

    /// Clears `triggered` and marks the cell dirty so the false value gets
    /// persisted. An idle, clean cell is left untouched because its durable
    /// value is already false.
    ///
    /// Returns the state observed before the clear.
    pub fn clear(&self) -> LatchState {
        let prev = self
            .bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                if bits == 0 { None } else { Some(DIRTY) }
            });
        match prev {
            Ok(bits) | Err(bits) => LatchState::from_bits(bits),
        }
    }

    /// Clears `dirty` if the cell still holds exactly `written`.
    ///
    /// `written` is the snapshot whose `triggered` value was just committed.
    /// If an edge or a reset changed the cell in the meantime the exchange
    /// fails and the cell stays dirty, so the newer value is persisted on the
    /// next flush.
    pub fn confirm(&self, written: LatchState) -> bool {
        if !written.dirty {
            return self.load() == written;
        }
        let clean = LatchState {
            dirty: false,
            ..written
        };
        self.bits
            .compare_exchange(
                written.bits(),
                clean.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}
