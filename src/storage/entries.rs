//! Entry store: memory entries keyed by their logical key

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::Utc;

use super::snapshot::SnapshotFile;
use crate::error::Result;
use crate::types::{EntryType, MemoryEntry};
use crate::validation::validate_key;

/// Most recently updated first; key breaks timestamp ties.
pub(crate) fn recency_order(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.key.cmp(&b.key))
}

/// Durable map of memory entries.
///
/// Mutations are serialized by `writer` and applied to a staged copy of the
/// map. The copy replaces the live map only once its snapshot is on disk, so
/// a failed write leaves readers seeing the previous state.
pub struct EntryStore {
    entries: RwLock<HashMap<String, MemoryEntry>>,
    writer: Mutex<()>,
    snapshot: SnapshotFile,
}

impl EntryStore {
    /// Load the store from its snapshot
    pub fn open(snapshot: SnapshotFile) -> Result<Self> {
        let records: Vec<MemoryEntry> = snapshot.load()?;
        let entries = records
            .into_iter()
            .map(|entry| (entry.key.clone(), entry))
            .collect::<HashMap<_, _>>();

        tracing::info!(
            "Loaded {} memory entries from {}",
            entries.len(),
            snapshot.path().display()
        );

        Ok(Self {
            entries: RwLock::new(entries),
            writer: Mutex::new(()),
            snapshot,
        })
    }

    /// Apply `f` to a staged copy under the writer lock; when it reports a
    /// change, persist the copy and then make it live
    fn mutate<T>(&self, f: impl FnOnce(&mut HashMap<String, MemoryEntry>) -> (T, bool)) -> Result<T> {
        let _writer = self.writer.lock();

        let mut staged = self.entries.read().clone();
        let (out, changed) = f(&mut staged);

        if changed {
            let mut records: Vec<MemoryEntry> = staged.values().cloned().collect();
            records.sort_by(recency_order);
            if let Err(e) = self.snapshot.write(&records) {
                tracing::error!("Failed to persist entry snapshot: {}", e);
                return Err(e);
            }
            *self.entries.write() = staged;
        }

        Ok(out)
    }

    /// Create or overwrite the entry at `key`.
    ///
    /// Overwriting is a full reset: new id, fresh timestamps, zero access count.
    pub fn store(
        &self,
        key: &str,
        value: Value,
        entry_type: EntryType,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<MemoryEntry> {
        validate_key(key)?;
        let entry = MemoryEntry::new(key, value, entry_type, description, tags);

        let stored = self.mutate(|entries| {
            entries.insert(entry.key.clone(), entry.clone());
            (entry, true)
        })?;

        tracing::info!("Stored entry '{}'", key);
        Ok(stored)
    }

    /// Return the entry and record the access
    pub fn retrieve(&self, key: &str) -> Result<Option<MemoryEntry>> {
        validate_key(key)?;
        self.mutate(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = Utc::now();
                (Some(entry.clone()), true)
            }
            None => (None, false),
        })
    }

    /// Look at an entry without touching its access statistics
    pub fn get(&self, key: &str) -> Option<MemoryEntry> {
        self.entries.read().get(key).cloned()
    }

    /// Replace the value of an existing entry. `description` and `tags` are
    /// only replaced when provided. Never creates an entry.
    pub fn update(
        &self,
        key: &str,
        value: Value,
        description: Option<String>,
        tags: Option<Vec<String>>,
    ) -> Result<Option<MemoryEntry>> {
        validate_key(key)?;
        let updated = self.mutate(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.value = value;
                entry.updated_at = Utc::now();
                if let Some(description) = description {
                    entry.description = Some(description);
                }
                if let Some(tags) = tags {
                    entry.tags = tags;
                }
                (Some(entry.clone()), true)
            }
            None => (None, false),
        })?;

        if updated.is_some() {
            tracing::info!("Updated entry '{}'", key);
        }
        Ok(updated)
    }

    /// Remove an entry; returns whether anything was removed
    pub fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let removed = self.mutate(|entries| {
            let removed = entries.remove(key).is_some();
            (removed, removed)
        })?;

        if removed {
            tracing::info!("Deleted entry '{}'", key);
        }
        Ok(removed)
    }

    /// All entries, most recently updated first
    pub fn list(&self) -> Vec<MemoryEntry> {
        let mut entries: Vec<MemoryEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(recency_order);
        entries
    }

    /// Remove everything; returns the prior count
    pub fn clear(&self) -> Result<usize> {
        let cleared = self.mutate(|entries| {
            let count = entries.len();
            entries.clear();
            (count, true)
        })?;

        tracing::info!("Cleared {} entries", cleared);
        Ok(cleared)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
