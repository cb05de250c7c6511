//! Weighted substring relevance
//!
//! Scores are additive across fields; a candidate with a total of zero is not
//! a match.

use serde_json::Value;

use crate::types::{MemoryEntry, ToolDefinition};

pub const EXACT_SCORE: f64 = 100.0;
pub const PREFIX_SCORE: f64 = 80.0;
pub const CONTAINS_SCORE: f64 = 60.0;
pub const WORD_PREFIX_SCORE: f64 = 40.0;
pub const WORD_CONTAINS_SCORE: f64 = 20.0;

/// Field weights for memory entries
pub mod entry_weights {
    pub const KEY: f64 = 2.0;
    pub const DESCRIPTION: f64 = 1.5;
    pub const TAG: f64 = 1.0;
    pub const TEXT_VALUE: f64 = 0.8;
    pub const STRUCTURED_VALUE: f64 = 0.5;
}

/// Field weights for tools
pub mod tool_weights {
    pub const NAME: f64 = 3.0;
    pub const DESCRIPTION: f64 = 2.0;
    pub const TYPE: f64 = 1.5;
    pub const HANDLER: f64 = 0.5;
}

/// Lowercase and trim a raw query
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Score one text field against an already normalized query.
///
/// Whole-query matches win outright. Otherwise each whitespace-separated word
/// of the text is checked against each word of the query, and the first word
/// that matches decides the score.
pub fn relevance(text: &str, query: &str) -> f64 {
    if text.is_empty() || query.is_empty() {
        return 0.0;
    }

    let text = text.to_lowercase();
    if text == query {
        return EXACT_SCORE;
    }
    if text.starts_with(query) {
        return PREFIX_SCORE;
    }
    if text.contains(query) {
        return CONTAINS_SCORE;
    }

    let query_words: Vec<&str> = query.split_whitespace().collect();
    for word in text.split_whitespace() {
        if query_words.iter().any(|q| word.starts_with(q)) {
            return WORD_PREFIX_SCORE;
        }
        if query_words.iter().any(|q| word.contains(q)) {
            return WORD_CONTAINS_SCORE;
        }
    }

    0.0
}

/// Total weighted score of an entry
pub fn score_entry(entry: &MemoryEntry, query: &str) -> f64 {
    let mut score = relevance(&entry.key, query) * entry_weights::KEY;

    if let Some(description) = &entry.description {
        score += relevance(description, query) * entry_weights::DESCRIPTION;
    }

    for tag in &entry.tags {
        score += relevance(tag, query) * entry_weights::TAG;
    }

    score += match &entry.value {
        Value::String(s) => relevance(s, query) * entry_weights::TEXT_VALUE,
        Value::Array(_) | Value::Object(_) => {
            relevance(&entry.value.to_string(), query) * entry_weights::STRUCTURED_VALUE
        }
        _ => 0.0,
    };

    score
}

/// Total weighted score of a tool
pub fn score_tool(tool: &ToolDefinition, query: &str) -> f64 {
    relevance(&tool.name, query) * tool_weights::NAME
        + relevance(&tool.description, query) * tool_weights::DESCRIPTION
        + relevance(tool.tool_type.as_str(), query) * tool_weights::TYPE
        + relevance(&tool.handler_script, query) * tool_weights::HANDLER
}
