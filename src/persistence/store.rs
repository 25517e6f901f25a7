//! The durable storage capability consumed by the latch.
//!
//! A store holds exactly one boolean under a namespace/key pair. Writes are
//! commit-on-write: after `save` returns `Ok`, a power loss must not expose
//! the previous value or a partial write.

use std::fmt;
use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The stored record could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The stored record was written by an incompatible version.
    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    /// The backing medium refused the operation (e.g. it is busy or offline).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Identifies the single value a store manages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoreKey {
    pub namespace: String,
    pub key: String,
}

impl StoreKey {
    pub fn new(namespace: impl Into<String>, key: impl Into<String>) -> Self {
        StoreKey {
            namespace: namespace.into(),
            key: key.into(),
        }
    }
}

impl Default for StoreKey {
    fn default() -> Self {
        StoreKey::new("doormon", "triggered")
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.key)
    }
}

/// Crash-safe storage for the latched value.
///
/// Both calls may block on the storage medium. Callers on an async runtime
/// run them through `spawn_blocking`.
pub trait Store: Send + Sync {
    /// Returns the last committed value, or `None` if nothing was ever saved.
    fn load(&self) -> Result<Option<bool>>;

    /// Durably commits `triggered`.
    fn save(&self, triggered: bool) -> Result<()>;
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn load(&self) -> Result<Option<bool>> {
        (**self).load()
    }

    fn save(&self, triggered: bool) -> Result<()> {
        (**self).save(triggered)
    }
}

impl<S: Store + ?Sized> Store for Box<S> {
    fn load(&self) -> Result<Option<bool>> {
        (**self).load()
    }

    fn save(&self, triggered: bool) -> Result<()> {
        (**self).save(triggered)
    }
}
