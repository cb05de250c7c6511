//! Storage engine for Memvault
//!
//! Two independent stores, one for memory entries and one for tools, each
//! backed by a whole-file JSON snapshot that is rewritten on every mutation.

mod entries;
mod snapshot;
mod tools;

pub use entries::EntryStore;
pub use snapshot::SnapshotFile;
pub use tools::ToolStore;

pub(crate) use entries::recency_order;
pub(crate) use tools::creation_order;

use std::sync::Arc;

use crate::error::{MemvaultError, Result};
use crate::types::VaultConfig;

/// Shared handle over both stores. Cloning is cheap.
#[derive(Clone)]
pub struct Storage {
    entries: Arc<EntryStore>,
    tools: Arc<ToolStore>,
}

impl Storage {
    /// Open both stores under the configured data directory
    pub fn open(config: &VaultConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        let entries = EntryStore::open(SnapshotFile::new(config.entries_path()))?;
        let tools = ToolStore::open(SnapshotFile::new(config.tools_path()))?;

        Ok(Self {
            entries: Arc::new(entries),
            tools: Arc::new(tools),
        })
    }

    pub fn entries(&self) -> &EntryStore {
        &self.entries
    }

    pub fn tools(&self) -> &ToolStore {
        &self.tools
    }

    /// Run synchronous store work on the blocking pool. Mutations take the
    /// writer locks and rewrite whole snapshots, so async callers go through here.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Storage) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let storage = self.clone();
        tokio::task::spawn_blocking(move || f(&storage))
            .await
            .map_err(|e| MemvaultError::Internal(format!("storage task failed: {}", e)))?
    }

    /// Empty both stores; returns `(entries_cleared, tools_cleared)`
    pub fn reset(&self) -> Result<(usize, usize)> {
        let entries = self.entries.clear()?;
        let tools = self.tools.clear()?;
        Ok((entries, tools))
    }
}
