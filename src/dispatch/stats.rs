//! Vault statistics

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::storage::Storage;
use crate::types::{MemoryEntry, ToolDefinition};

/// Number of key prefixes and recent tools reported
const TOP_N: usize = 5;

static KEY_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[._\-:]").expect("valid key separator regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyPattern {
    pub prefix: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryStats {
    pub total_entries: usize,
    /// Length of the serialized entry collection, in bytes
    pub total_size: usize,
    pub by_type: BTreeMap<String, usize>,
    pub tag_counts: BTreeMap<String, usize>,
    pub key_patterns: Vec<KeyPattern>,
    pub total_accesses: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<MemoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<MemoryEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_accessed_entry: Option<MemoryEntry>,
}

impl EntryStats {
    pub fn collect(entries: &[MemoryEntry]) -> Self {
        let mut by_type = BTreeMap::new();
        let mut tag_counts = BTreeMap::new();
        let mut prefixes: HashMap<String, usize> = HashMap::new();

        for entry in entries {
            *by_type.entry(entry.entry_type.to_string()).or_insert(0) += 1;
            for tag in &entry.tags {
                *tag_counts.entry(tag.clone()).or_insert(0) += 1;
            }
            let prefix = KEY_SEPARATOR
                .split(&entry.key)
                .next()
                .unwrap_or(&entry.key)
                .to_string();
            *prefixes.entry(prefix).or_insert(0) += 1;
        }

        let mut key_patterns: Vec<KeyPattern> = prefixes
            .into_iter()
            .map(|(prefix, count)| KeyPattern { prefix, count })
            .collect();
        key_patterns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.prefix.cmp(&b.prefix)));
        key_patterns.truncate(TOP_N);

        let total_size = serde_json::to_string(entries).map(|s| s.len()).unwrap_or(0);

        Self {
            total_entries: entries.len(),
            total_size,
            by_type,
            tag_counts,
            key_patterns,
            total_accesses: entries.iter().map(|e| e.access_count).sum(),
            oldest_entry: entries
                .iter()
                .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)))
                .cloned(),
            newest_entry: entries
                .iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| b.key.cmp(&a.key)))
                .cloned(),
            most_accessed_entry: entries
                .iter()
                .filter(|e| e.access_count > 0)
                .max_by(|a, b| a.access_count.cmp(&b.access_count).then_with(|| b.key.cmp(&a.key)))
                .cloned(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStats {
    pub total_tools: usize,
    pub by_type: BTreeMap<String, usize>,
    pub total_usage: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_used_tool: Option<ToolDefinition>,
    /// Newest first
    pub recent_tools: Vec<ToolDefinition>,
}

impl ToolStats {
    /// `tools` must already be in creation order, newest first
    pub fn collect(tools: &[ToolDefinition]) -> Self {
        let mut by_type = BTreeMap::new();
        for tool in tools {
            *by_type.entry(tool.tool_type.to_string()).or_insert(0) += 1;
        }

        Self {
            total_tools: tools.len(),
            by_type,
            total_usage: tools.iter().map(|t| t.usage_count).sum(),
            most_used_tool: tools
                .iter()
                .filter(|t| t.usage_count > 0)
                .max_by(|a, b| a.usage_count.cmp(&b.usage_count).then_with(|| b.name.cmp(&a.name)))
                .cloned(),
            recent_tools: tools.iter().take(TOP_N).cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VaultStats {
    pub entries: EntryStats,
    pub tools: ToolStats,
}

impl VaultStats {
    pub fn collect(storage: &Storage) -> Self {
        Self {
            entries: EntryStats::collect(&storage.entries().list()),
            tools: ToolStats::collect(&storage.tools().list()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryType, ToolType};
    use chrono::{Duration, Utc};
    use serde_json::{json, Map};

    fn entry(key: &str, tags: &[&str], age_secs: i64, accesses: u64) -> MemoryEntry {
        let mut entry = MemoryEntry::new(
            key,
            json!("v"),
            EntryType::Text,
            None,
            tags.iter().map(|t| t.to_string()).collect(),
        );
        entry.created_at = Utc::now() - Duration::seconds(age_secs);
        entry.access_count = accesses;
        entry
    }

    #[test]
    fn test_empty_vault() {
        let stats = EntryStats::collect(&[]);
        assert_eq!(stats.total_entries, 0);
        assert!(stats.oldest_entry.is_none());
        assert!(stats.most_accessed_entry.is_none());
        assert!(stats.key_patterns.is_empty());

        let tools = ToolStats::collect(&[]);
        assert_eq!(tools.total_usage, 0);
        assert!(tools.most_used_tool.is_none());
    }

    #[test]
    fn test_entry_stats() {
        let entries = vec![
            entry("user.name", &["profile"], 30, 2),
            entry("user.email", &["profile", "contact"], 20, 7),
            entry("project-x", &[], 10, 0),
        ];
        let stats = EntryStats::collect(&entries);

        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.total_accesses, 9);
        assert_eq!(stats.by_type.get("text"), Some(&3));
        assert_eq!(stats.tag_counts.get("profile"), Some(&2));
        assert_eq!(stats.oldest_entry.unwrap().key, "user.name");
        assert_eq!(stats.newest_entry.unwrap().key, "project-x");
        assert_eq!(stats.most_accessed_entry.unwrap().key, "user.email");
        assert_eq!(
            stats.key_patterns[0],
            KeyPattern {
                prefix: "user".into(),
                count: 2
            }
        );
        assert!(stats.total_size > 0);
    }

    #[test]
    fn test_tool_stats() {
        let mut a = ToolDefinition::new("a", "", ToolType::Processor, Map::new(), "1");
        a.usage_count = 3;
        let mut b = ToolDefinition::new("b", "", ToolType::Analyzer, Map::new(), "1");
        b.usage_count = 5;

        let stats = ToolStats::collect(&[a, b]);
        assert_eq!(stats.total_tools, 2);
        assert_eq!(stats.total_usage, 8);
        assert_eq!(stats.most_used_tool.unwrap().name, "b");
        assert_eq!(stats.by_type.get("analyzer"), Some(&1));
        assert_eq!(stats.recent_tools.len(), 2);
    }
}
