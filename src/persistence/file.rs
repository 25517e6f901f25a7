//! File-backed store.
//!
//! The value lives at `<root>/<namespace>/<key>.json` as a small JSON record.
//!
//! # Atomic Writes
//!
//! Every save goes through write-to-temp-then-rename:
//! 1. Write to `<key>.json.tmp`
//! 2. fsync the temp file
//! 3. Rename over `<key>.json`
//! 4. fsync the namespace directory
//!
//! A reader after power loss sees either the previous record or the new one.
//! A leftover `.tmp` file from an interrupted save is never read and is
//! overwritten by the next save.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::store::{Result, Store, StoreError, StoreKey};

/// Current record schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: u32 = 1;

/// On-disk representation of the latched value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLatch {
    /// Schema version for forward-compatible migrations.
    pub schema_version: u32,

    /// The committed latch value.
    pub triggered: bool,

    /// When this record was written.
    pub saved_at: DateTime<Utc>,
}

impl PersistedLatch {
    pub fn new(triggered: bool) -> Self {
        PersistedLatch {
            schema_version: SCHEMA_VERSION,
            triggered,
            saved_at: Utc::now(),
        }
    }
}

/// A [`Store`] that keeps one JSON record per key on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Creates a store for `key` under `root`. Nothing is touched on disk
    /// until the first save.
    pub fn new(root: impl AsRef<Path>, key: &StoreKey) -> Self {
        let path = root
            .as_ref()
            .join(&key.namespace)
            .join(format!("{}.json", key.key));
        FileStore { path }
    }

    /// Returns the path of the committed record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

impl Store for FileStore {
    fn load(&self) -> Result<Option<bool>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: PersistedLatch = serde_json::from_slice(&bytes)?;
        if record.schema_version != SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                got: record.schema_version,
            });
        }

        Ok(Some(record.triggered))
    }

    fn save(&self, triggered: bool) -> Result<()> {
        let parent = self.path.parent();
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.tmp_path();
        let bytes = serde_json::to_vec(&PersistedLatch::new(triggered))?;

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }

        std::fs::rename(&tmp_path, &self.path)?;

        // The rename is only durable once the directory entry is synced.
        if let Some(parent) = parent {
            sync_dir(parent)?;
        }

        trace!(path = %self.path.display(), triggered, "Latch record committed");
        Ok(())
    }
}

/// fsyncs a directory so that entries created or renamed in it survive
/// power loss.
fn sync_dir(dir: &Path) -> io::Result<()> {
    File::open(dir)?.sync_all()
}
