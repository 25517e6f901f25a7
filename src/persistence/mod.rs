//! Durable storage for the latched value.
//!
//! The latch depends only on the [`Store`] trait. Two implementations ship
//! with the crate:
//! - [`FileStore`]: one JSON record per key, written atomically with fsync
//! - [`MemoryStore`]: shared in-memory cell for tests and embedding
//!
//! # File Layout
//!
//! ```text
//! <state_dir>/<namespace>/
//!   <key>.json        # committed record
//!   <key>.json.tmp    # in-flight write (ignored on load)
//! ```

pub mod file;
pub mod memory;
pub mod store;

pub use file::{FileStore, PersistedLatch, SCHEMA_VERSION};
pub use memory::MemoryStore;
pub use store::{Store, StoreError, StoreKey};
