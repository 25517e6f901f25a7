//! In-memory store.
//!
//! Useful for embedding the latch where no durable medium exists, and as the
//! backing for tests. Clones share the same cell, so dropping one `Latch` and
//! seeding a new one from a clone behaves like a reboot over the same
//! medium.

use std::sync::{Arc, Mutex, PoisonError};

use super::store::{Result, Store};

/// A [`Store`] whose "durable" value lives in shared memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    value: Arc<Mutex<Option<bool>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `value`.
    pub fn with_value(value: bool) -> Self {
        MemoryStore {
            value: Arc::new(Mutex::new(Some(value))),
        }
    }

    /// Returns the committed value without going through the trait.
    pub fn peek(&self) -> Option<bool> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Option<bool>> {
        Ok(self.peek())
    }

    fn save(&self, triggered: bool) -> Result<()> {
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(triggered);
        Ok(())
    }
}
