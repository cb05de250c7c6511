//! Export and import of the whole vault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemvaultError, Result};
use crate::storage::Storage;
use crate::types::{EntryType, MemoryEntry, ToolDefinition, ToolType};
use crate::validation::{is_missing, validate_key, validate_tool_name, ValidationError};

/// Portable copy of every entry and tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub entries: Vec<MemoryEntry>,
    pub tools: Vec<ToolDefinition>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl Backup {
    pub fn export(storage: &Storage) -> Self {
        Self {
            entries: storage.entries().list(),
            tools: storage.tools().list(),
            timestamp: Utc::now(),
            version: crate::VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub restored: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl ImportReport {
    fn skip(&mut self, label: String, err: impl std::fmt::Display) {
        self.skipped += 1;
        self.errors.push(format!("{}: {}", label, err));
    }
}

/// Restore a backup document. `data` may be the document or its JSON text.
///
/// Records are read loosely so one bad item never aborts the rest: entries
/// are upserted by key, tools whose name is taken are skipped.
pub fn restore(storage: &Storage, data: &Value) -> Result<ImportReport> {
    let parsed;
    let document = match data {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).map_err(|e| {
                MemvaultError::from(ValidationError::invalid("data", format!("not valid JSON: {}", e)))
            })?;
            &parsed
        }
        other => other,
    };

    let Some(document) = document.as_object() else {
        return Err(ValidationError::invalid("data", "expected an object with entries").into());
    };

    let mut report = ImportReport::default();

    let entries = document.get("entries").and_then(Value::as_array);
    for (index, item) in entries.into_iter().flatten().enumerate() {
        let label = item
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("entries[{}]", index));
        match restore_entry(storage, item) {
            Ok(()) => report.restored += 1,
            Err(e) => report.skip(label, e),
        }
    }

    let tools = document.get("tools").and_then(Value::as_array);
    for (index, item) in tools.into_iter().flatten().enumerate() {
        let label = item
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("tools[{}]", index));
        match restore_tool(storage, item) {
            Ok(()) => report.restored += 1,
            Err(e) => report.skip(label, e),
        }
    }

    tracing::info!(
        "Import finished: {} restored, {} skipped",
        report.restored,
        report.skipped
    );
    Ok(report)
}

fn string_field<'a>(item: &'a Value, field: &str) -> Option<&'a str> {
    item.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn restore_entry(storage: &Storage, item: &Value) -> Result<()> {
    let key = string_field(item, "key").ok_or_else(|| ValidationError::Missing("key".into()))?;
    validate_key(key)?;

    let value = item.get("value");
    if is_missing(value) {
        return Err(ValidationError::Missing("value".into()).into());
    }

    let entry_type = string_field(item, "type")
        .and_then(|t| t.parse::<EntryType>().ok())
        .unwrap_or_default();
    let description = string_field(item, "description").map(str::to_string);
    let tags = item
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    storage.entries().store(
        key,
        value.cloned().unwrap_or(Value::Null),
        entry_type,
        description,
        tags,
    )?;
    Ok(())
}

fn restore_tool(storage: &Storage, item: &Value) -> Result<()> {
    let name = string_field(item, "name").ok_or_else(|| ValidationError::Missing("name".into()))?;
    validate_tool_name(name)?;

    let script = string_field(item, "handlerCode")
        .or_else(|| string_field(item, "handlerScript"))
        .ok_or_else(|| ValidationError::Missing("handlerCode".into()))?;

    let tool_type = string_field(item, "type")
        .and_then(|t| t.parse::<ToolType>().ok())
        .unwrap_or_default();
    let parameters = item
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_else(Map::new);

    let mut tool = ToolDefinition::new(
        name,
        string_field(item, "description").unwrap_or_default(),
        tool_type,
        parameters,
        script,
    );
    if item.get("networkAccess").and_then(Value::as_bool).unwrap_or(false) {
        tool = tool.with_network_access();
    }

    storage.tools().create(tool)?;
    Ok(())
}
