//! Keyset store (C3): holds the current `Projection` and hot-swaps it on
//! reload.
//!
//! `reload()` builds the new `Projection` *before* acquiring the write
//! lock, so the critical section is a bare pointer swap with no suspension
//! point inside it (spec.md §5, §9). `get()` only ever takes a brief read
//! lock to clone the `Arc`, so readers never block each other for longer
//! than that clone.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use keys_core::{project, Projection, ProjectionWarning};
use keys_protocol::AdminDb;
use tokio::sync::RwLock;
use tracing::warn;

pub type Validator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub struct KeysetStore {
    keydb_path: PathBuf,
    validate: Validator,
    current: RwLock<Arc<Projection>>,
}

impl KeysetStore {
    /// Loads the admin db at `keydb_path` and builds the initial
    /// projection. A missing or unparseable db at startup is fatal --
    /// `reload()` is the one that tolerates it later (spec.md §7: reload
    /// errors keep serving the previous projection, but there is no
    /// previous projection to fall back to at startup).
    pub fn load(keydb_path: PathBuf, validate: Validator) -> Result<Self, keys_core::CoreError> {
        let db = keys_core::load_db(&keydb_path)?;
        let (projection, warnings) = project(&db, validate.as_ref());
        log_warnings(&warnings);
        Ok(Self {
            keydb_path,
            validate,
            current: RwLock::new(Arc::new(projection)),
        })
    }

    pub fn keydb_path(&self) -> &Path {
        &self.keydb_path
    }

    /// The blob to send to `hostname` (or the wildcard blob for `None`),
    /// as of the most recently published projection.
    pub async fn get(&self, hostname: Option<&str>) -> Vec<u8> {
        let projection = Arc::clone(&*self.current.read().await);
        projection.blob_for(hostname).to_vec()
    }

    /// Re-reads the admin db and republishes a fresh projection. Errors
    /// (missing file, bad JSON) are logged and leave the previous
    /// projection in service, per spec.md §7 "reload error ... keep
    /// serving the previous projection." Concurrent callers of `reload`
    /// serialize on the write lock (spec.md §4.3).
    pub async fn reload(&self) {
        let db = match keys_core::load_db(&self.keydb_path) {
            Ok(db) => db,
            Err(err) => {
                warn!(error = %err, "reload failed, keeping previous projection");
                return;
            }
        };
        let (projection, warnings) = project(&db, self.validate.as_ref());
        log_warnings(&warnings);
        *self.current.write().await = Arc::new(projection);
    }

    /// Test helper: builds a store directly from an in-memory `AdminDb`,
    /// bypassing the filesystem.
    #[cfg(test)]
    pub(crate) fn from_db_for_tests(keydb_path: PathBuf, db: &AdminDb, validate: Validator) -> Self {
        let (projection, warnings) = project(db, validate.as_ref());
        log_warnings(&warnings);
        Self {
            keydb_path,
            validate,
            current: RwLock::new(Arc::new(projection)),
        }
    }
}

fn log_warnings(warnings: &[ProjectionWarning]) {
    for w in warnings {
        warn!(%w, "excluded from projection");
    }
}
