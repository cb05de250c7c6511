//! "Did you mean" suggestions for searches that found nothing

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{MemoryEntry, ToolDefinition};

/// Maximum number of suggestions returned
pub const MAX_SUGGESTIONS: usize = 5;

/// Length of the query prefix that candidates must share
const PREFIX_CHARS: usize = 3;

/// Separators used to split keys and tool names into words
static WORD_SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[._\-\s]+").expect("valid separator regex"));

/// Collect up to five words from keys, tags and tool names that contain the
/// first three characters of `query`. Order follows first discovery.
pub fn suggestions(query: &str, entries: &[MemoryEntry], tools: &[ToolDefinition]) -> Vec<String> {
    let prefix: String = query.chars().take(PREFIX_CHARS).collect();
    let mut found: Vec<String> = Vec::new();

    let mut add = |candidate: String| {
        if !found.contains(&candidate) {
            found.push(candidate);
        }
    };

    let words_of = |name: &str| -> Vec<String> {
        WORD_SEPARATORS
            .split(&name.to_lowercase())
            .filter(|word| word.chars().count() > 2 && word.contains(&prefix))
            .map(str::to_string)
            .collect()
    };

    for entry in entries {
        for word in words_of(&entry.key) {
            add(word);
        }
        for tag in &entry.tags {
            if tag.to_lowercase().contains(&prefix) {
                add(tag.clone());
            }
        }
    }

    for tool in tools {
        for word in words_of(&tool.name) {
            add(word);
        }
    }

    found.truncate(MAX_SUGGESTIONS);
    found
}
