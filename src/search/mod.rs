//! Search functionality for Memvault
//!
//! Implements:
//! - Weighted substring relevance over entries and tools
//! - Suggestion fallback when nothing matches

mod relevance;
mod suggest;

pub use relevance::*;
pub use suggest::*;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::Result;
use crate::storage::Storage;
use crate::types::{MemoryEntry, ToolDefinition, DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
use crate::validation::ValidationError;

/// Combined search results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResults {
    pub entries: Vec<MemoryEntry>,
    pub tools: Vec<ToolDefinition>,
    pub total_found: usize,
    pub query: String,
    /// Milliseconds spent searching
    pub search_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// Resolve a caller limit: missing or zero means the default, and nothing
/// exceeds the hard cap.
pub fn effective_limit(limit: Option<usize>) -> usize {
    match limit {
        None | Some(0) => DEFAULT_SEARCH_LIMIT,
        Some(n) => n.min(MAX_SEARCH_LIMIT),
    }
}

fn normalized_or_reject(query: &str) -> Result<String> {
    let normalized = normalize_query(query);
    if normalized.is_empty() {
        return Err(ValidationError::Missing("query".to_string()).into());
    }
    Ok(normalized)
}

/// Rank candidates by score, keeping input order for equal scores
fn rank<T>(candidates: Vec<T>, score: impl Fn(&T) -> f64, limit: usize) -> Vec<T> {
    let mut scored: Vec<(f64, T)> = candidates
        .into_iter()
        .map(|c| (score(&c), c))
        .filter(|(s, _)| *s > 0.0)
        .collect();

    // sort_by is stable, so ties keep the store's recency order
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

/// Matching entries, best first
pub fn search_entries(storage: &Storage, query: &str, limit: Option<usize>) -> Result<Vec<MemoryEntry>> {
    let query = normalized_or_reject(query)?;
    Ok(rank(
        storage.entries().list(),
        |entry| score_entry(entry, &query),
        effective_limit(limit),
    ))
}

/// Matching tools, best first
pub fn search_tools(storage: &Storage, query: &str, limit: Option<usize>) -> Result<Vec<ToolDefinition>> {
    let query = normalized_or_reject(query)?;
    Ok(rank(
        storage.tools().list(),
        |tool| score_tool(tool, &query),
        effective_limit(limit),
    ))
}

/// Search entries and tools together. The limit applies to each collection.
pub fn search(storage: &Storage, query: &str, limit: Option<usize>) -> Result<SearchResults> {
    let start = Instant::now();
    let normalized = normalized_or_reject(query)?;
    let limit = effective_limit(limit);

    let all_entries = storage.entries().list();
    let all_tools = storage.tools().list();

    let entries = rank(all_entries.clone(), |e| score_entry(e, &normalized), limit);
    let tools = rank(all_tools.clone(), |t| score_tool(t, &normalized), limit);
    let total_found = entries.len() + tools.len();

    let suggestions = if total_found == 0 {
        Some(suggestions(&normalized, &all_entries, &all_tools))
    } else {
        None
    };

    tracing::debug!(
        "Search '{}' found {} entries and {} tools",
        normalized,
        entries.len(),
        tools.len()
    );

    Ok(SearchResults {
        entries,
        tools,
        total_found,
        query: query.to_string(),
        search_time: start.elapsed().as_millis() as u64,
        suggestions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MemvaultError;
    use crate::types::{EntryType, VaultConfig};
    use serde_json::json;
    use tempfile::{tempdir, TempDir};

    fn storage() -> (TempDir, Storage) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(&VaultConfig::new(dir.path())).unwrap();
        (dir, storage)
    }

    #[test]
    fn test_empty_query_rejected() {
        let (_dir, storage) = storage();
        assert!(matches!(
            search(&storage, "", None),
            Err(MemvaultError::Validation(_))
        ));
        assert!(search(&storage, "   ", Some(5)).is_err());
    }

    #[test]
    fn test_exact_then_prefix_then_tag() {
        let (_dir, storage) = storage();
        let entries = storage.entries();
        entries
            .store("beta", json!(""), EntryType::Text, None, vec!["alpha".into()])
            .unwrap();
        entries.store("alphabet", json!(""), EntryType::Text, None, vec![]).unwrap();
        entries.store("alpha", json!(""), EntryType::Text, None, vec![]).unwrap();

        let results = search(&storage, "alpha", None).unwrap();
        let keys: Vec<&str> = results.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["alpha", "alphabet", "beta"]);
        assert_eq!(results.total_found, 3);
        assert!(results.suggestions.is_none());
    }

    #[test]
    fn test_no_match_yields_suggestions() {
        let (_dir, storage) = storage();
        storage
            .entries()
            .store("weather.today", json!("sunny"), EntryType::Text, None, vec![])
            .unwrap();

        let results = search(&storage, "weatherman", None).unwrap();
        assert_eq!(results.total_found, 0);
        assert_eq!(results.suggestions, Some(vec!["weather".to_string()]));
    }

    #[test]
    fn test_limit_is_clamped() {
        assert_eq!(effective_limit(None), DEFAULT_SEARCH_LIMIT);
        assert_eq!(effective_limit(Some(0)), DEFAULT_SEARCH_LIMIT);
        assert_eq!(effective_limit(Some(3)), 3);
        assert_eq!(effective_limit(Some(1000)), MAX_SEARCH_LIMIT);
    }
}
