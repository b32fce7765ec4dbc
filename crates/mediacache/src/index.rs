//! # Index Store
//!
//! Durable URL-to-entry mapping persisted as a single JSON document at
//! the cache root. The index is best-effort state: loads tolerate an
//! absent, unreadable or corrupt document by starting cold, and a lost
//! index only costs re-downloads, never correctness.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::CacheEntry;

/// In-memory shape of the persisted index
pub type CacheIndex = HashMap<String, CacheEntry>;

const INDEX_FILE: &str = "index.json";

/// Reads and writes the persisted index document
#[derive(Debug, Clone)]
pub struct IndexStore {
    path: PathBuf,
}

impl IndexStore {
    /// Store backed by `index.json` under the cache root
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(INDEX_FILE),
        }
    }

    /// Location of the persisted document
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the full mapping. An absent, unreadable or corrupt
    /// document yields an empty index: the cache starts cold instead
    /// of failing.
    pub async fn load(&self) -> CacheIndex {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?self.path, "no persisted index, starting cold");
                return CacheIndex::new();
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "failed to read index, starting cold");
                return CacheIndex::new();
            }
        };

        match serde_json::from_slice::<CacheIndex>(&raw) {
            Ok(index) => {
                debug!(entries = index.len(), "loaded cache index");
                index
            }
            Err(e) => {
                warn!(path = ?self.path, error = %e, "corrupt cache index, starting cold");
                CacheIndex::new()
            }
        }
    }

    /// Persist the full mapping. The document is written to a
    /// temporary file and renamed into place, so a crash mid-save can
    /// never leave a truncated index behind.
    pub async fn save(&self, index: &CacheIndex) -> Result<(), CacheError> {
        let json = serde_json::to_vec(index)?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &json).await?;

        if let Err(e) = fs::rename(&tmp_path, &self.path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}
