//! Tool store: tool definitions keyed by id, with name as a unique secondary key

use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::HashMap;

use super::snapshot::SnapshotFile;
use crate::error::{MemvaultError, Result};
use crate::types::ToolDefinition;
use crate::validation::validate_tool_name;

/// Most recently created first; name breaks timestamp ties.
pub(crate) fn creation_order(a: &ToolDefinition, b: &ToolDefinition) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| a.name.cmp(&b.name))
}

/// Durable map of tool definitions. Same locking discipline as the entry store.
pub struct ToolStore {
    tools: RwLock<HashMap<String, ToolDefinition>>,
    writer: Mutex<()>,
    snapshot: SnapshotFile,
}

impl ToolStore {
    pub fn open(snapshot: SnapshotFile) -> Result<Self> {
        let records: Vec<ToolDefinition> = snapshot.load()?;
        let tools = records
            .into_iter()
            .map(|tool| (tool.id.clone(), tool))
            .collect::<HashMap<_, _>>();

        tracing::info!(
            "Loaded {} tools from {}",
            tools.len(),
            snapshot.path().display()
        );

        Ok(Self {
            tools: RwLock::new(tools),
            writer: Mutex::new(()),
            snapshot,
        })
    }

    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, ToolDefinition>) -> Result<(T, bool)>,
    ) -> Result<T> {
        let _writer = self.writer.lock();

        let mut staged = self.tools.read().clone();
        let (out, changed) = f(&mut staged)?;

        if changed {
            let mut records: Vec<ToolDefinition> = staged.values().cloned().collect();
            records.sort_by(creation_order);
            if let Err(e) = self.snapshot.write(&records) {
                tracing::error!("Failed to persist tool snapshot: {}", e);
                return Err(e);
            }
            *self.tools.write() = staged;
        }

        Ok(out)
    }

    /// Insert a new tool. Fails when the name is already taken.
    pub fn create(&self, tool: ToolDefinition) -> Result<ToolDefinition> {
        validate_tool_name(&tool.name)?;

        let created = self.mutate(|tools| {
            if tools.values().any(|t| t.name == tool.name) {
                return Err(MemvaultError::DuplicateName(tool.name.clone()));
            }
            tools.insert(tool.id.clone(), tool.clone());
            Ok((tool, true))
        })?;

        tracing::info!("Created tool '{}' ({})", created.name, created.id);
        Ok(created)
    }

    /// Resolve by id first, then by name
    pub fn get(&self, identifier: &str) -> Option<ToolDefinition> {
        let tools = self.tools.read();
        tools
            .get(identifier)
            .or_else(|| tools.values().find(|t| t.name == identifier))
            .cloned()
    }

    /// Bump the usage counter of the tool with this id and persist
    pub fn record_usage(&self, id: &str) -> Result<Option<ToolDefinition>> {
        self.mutate(|tools| match tools.get_mut(id) {
            Some(tool) => {
                tool.usage_count += 1;
                Ok((Some(tool.clone()), true))
            }
            None => Ok((None, false)),
        })
    }

    /// Remove by id; returns whether anything was removed
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.mutate(|tools| {
            let removed = tools.remove(id).is_some();
            Ok((removed, removed))
        })?;

        if removed {
            tracing::info!("Deleted tool {}", id);
        }
        Ok(removed)
    }

    /// All tools, most recently created first
    pub fn list(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.read().values().cloned().collect();
        tools.sort_by(creation_order);
        tools
    }

    pub fn clear(&self) -> Result<usize> {
        let cleared = self.mutate(|tools| {
            let count = tools.len();
            tools.clear();
            Ok((count, true))
        })?;

        tracing::info!("Cleared {} tools", cleared);
        Ok(cleared)
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolType;
    use serde_json::Map;
    use tempfile::{tempdir, TempDir};

    fn open_store() -> (TempDir, ToolStore) {
        let dir = tempdir().unwrap();
        let store = ToolStore::open(SnapshotFile::new(dir.path().join("tools.json"))).unwrap();
        (dir, store)
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, "test tool", ToolType::Processor, Map::new(), "args")
    }

    #[test]
    fn test_lookup_by_id_or_name() {
        let (_dir, store) = open_store();
        let created = store.create(tool("echo")).unwrap();

        assert_eq!(store.get(&created.id).unwrap().name, "echo");
        assert_eq!(store.get("echo").unwrap().id, created.id);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (_dir, store) = open_store();
        store.create(tool("echo")).unwrap();
        let err = store.create(tool("echo")).unwrap_err();
        assert!(matches!(err, MemvaultError::DuplicateName(name) if name == "echo"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (_dir, store) = open_store();
        assert!(matches!(
            store.create(tool("has.dot")),
            Err(MemvaultError::Validation(_))
        ));
    }

    #[test]
    fn test_delete_removes_exactly_one() {
        let (_dir, store) = open_store();
        store.create(tool("first")).unwrap();
        let second = store.create(tool("second")).unwrap();

        assert!(store.delete(&second.id).unwrap());
        let names: Vec<String> = store.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["first".to_string()]);
        assert!(!store.delete(&second.id).unwrap());
    }

    #[test]
    fn test_usage_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tools.json");
        let id = {
            let store = ToolStore::open(SnapshotFile::new(&path)).unwrap();
            let created = store.create(tool("counter")).unwrap();
            store.record_usage(&created.id).unwrap();
            store.record_usage(&created.id).unwrap();
            created.id
        };

        let reopened = ToolStore::open(SnapshotFile::new(&path)).unwrap();
        assert_eq!(reopened.get(&id).unwrap().usage_count, 2);
        assert!(reopened.record_usage("nope").unwrap().is_none());
    }

    #[test]
    fn test_list_newest_first() {
        let (_dir, store) = open_store();
        store.create(tool("older")).unwrap();
        store.create(tool("newer")).unwrap();
        let names: Vec<String> = store.list().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["newer".to_string(), "older".to_string()]);
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_failed_persist_leaves_store_unchanged() {
        let (dir, store) = open_store();
        let kept = store.create(tool("kept")).unwrap();

        std::fs::create_dir(dir.path().join("tools.json.tmp")).unwrap();

        assert!(store.create(tool("lost")).is_err());
        assert!(store.get("lost").is_none());
        assert!(store.record_usage(&kept.id).is_err());
        assert_eq!(store.get(&kept.id).unwrap().usage_count, 0);
        assert!(store.delete(&kept.id).is_err());
        assert_eq!(store.len(), 1);

        std::fs::remove_dir(dir.path().join("tools.json.tmp")).unwrap();
        assert!(store.create(tool("lost")).is_ok());
    }
}
