//! Action dispatcher
//!
//! One entry point for every vault operation. Requests arrive as a tagged
//! [`Action`], are routed to the stores, the search engine, the tool runner
//! and the reconciler, and come back as an [`ActionResponse`]. Every error
//! is caught here and reported in the envelope.

mod action;
mod backup;
mod stats;

pub use action::*;
pub use backup::{restore, Backup, ImportReport};
pub use stats::{EntryStats, KeyPattern, ToolStats, VaultStats};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use crate::error::{MemvaultError, Result};
use crate::exec::{ApiToolSpec, ToolRunner};
use crate::remote::{is_public, MirrorClient, Reconciler, SyncOutcome};
use crate::search;
use crate::storage::Storage;
use crate::types::{Source, Sourced, ToolDefinition, VaultConfig, DEFAULT_PAGE_LIMIT};
use crate::validation::{validate_required, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Wall time spent handling the request, in milliseconds
    pub execution_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
}

/// Uniform response envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
    pub metadata: ResponseMetadata,
}

impl ActionResponse {
    fn success(action: &str, outcome: Outcome, elapsed: Duration) -> Self {
        Self {
            success: true,
            action: action.to_string(),
            message: outcome.message,
            data: Some(outcome.data),
            timestamp: Utc::now(),
            metadata: ResponseMetadata {
                execution_time: elapsed.as_millis() as u64,
                error_code: None,
            },
        }
    }

    fn failure(action: &str, err: &MemvaultError, elapsed: Duration) -> Self {
        Self {
            success: false,
            action: action.to_string(),
            message: format!("Error: {}", err),
            data: None,
            timestamp: Utc::now(),
            metadata: ResponseMetadata {
                execution_time: elapsed.as_millis() as u64,
                error_code: Some(err.code()),
            },
        }
    }
}

/// What a handler produced before it is wrapped in the envelope
struct Outcome {
    message: String,
    data: Value,
}

impl Outcome {
    fn new(message: impl Into<String>, data: impl Serialize) -> Result<Self> {
        Ok(Self {
            message: message.into(),
            data: serde_json::to_value(data)?,
        })
    }

    /// Attach `firebaseSync`/`firebaseError` and mention the result in the message
    fn with_sync(mut self, sync: &SyncOutcome) -> Self {
        if let (Value::Object(data), Ok(Value::Object(extra))) =
            (&mut self.data, serde_json::to_value(sync))
        {
            data.extend(extra);
        }
        self.message = match &sync.firebase_error {
            None => format!("{} and synced to mirror", self.message),
            Some(e) => format!("{}; mirror sync failed: {}", self.message, e),
        };
        self
    }
}

fn required<'a>(field: &str, value: &'a Option<String>) -> Result<&'a str> {
    value
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ValidationError::Missing(field.to_string()).into())
}

fn tags_of(tags: &Option<Vec<String>>) -> &[String] {
    tags.as_deref().unwrap_or(&[])
}

/// Routes actions over one vault
#[derive(Clone)]
pub struct Dispatcher {
    storage: Storage,
    runner: ToolRunner,
    reconciler: Reconciler,
}

impl Dispatcher {
    /// Open the stores under `config.data_dir` and wire up the mirror, if any
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let storage = Storage::open(config)?;
        Ok(Self::new(storage, config))
    }

    pub fn new(storage: Storage, config: &VaultConfig) -> Self {
        let mirror = config.mirror.clone().map(MirrorClient::new);
        if let Some(mirror) = &mirror {
            tracing::info!("Remote mirror enabled at {}", mirror.base_url());
        }

        Self {
            runner: ToolRunner::new(storage.clone(), config.sandbox),
            reconciler: Reconciler::new(storage.clone(), mirror),
            storage,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Decode a raw envelope and dispatch it. Decode failures are reported
    /// in the envelope like any other error.
    pub async fn dispatch_value(&self, request: Value) -> ActionResponse {
        let start = Instant::now();
        let name = request
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        match serde_json::from_value::<Action>(request) {
            Ok(action) => self.dispatch(action).await,
            Err(e) => {
                let err = MemvaultError::from(ValidationError::invalid("request", e.to_string()));
                tracing::warn!("Rejected '{}' request: {}", name, err);
                ActionResponse::failure(&name, &err, start.elapsed())
            }
        }
    }

    pub async fn dispatch(&self, action: Action) -> ActionResponse {
        let start = Instant::now();
        let name = action.name();
        tracing::debug!("Dispatching '{}'", name);

        match self.route(action).await {
            Ok(outcome) => ActionResponse::success(name, outcome, start.elapsed()),
            Err(e) => {
                tracing::warn!("Action '{}' failed: {}", name, e);
                ActionResponse::failure(name, &e, start.elapsed())
            }
        }
    }

    async fn route(&self, action: Action) -> Result<Outcome> {
        match action {
            Action::Store(req) => self.store(req).await,
            Action::Retrieve(req) => self.retrieve(req).await,
            Action::Search(req) => self.search(req),
            Action::List(req) => self.list(req).await,
            Action::Delete(req) => self.delete(req).await,
            Action::Update(req) => self.update(req).await,
            Action::CreateTool(req) => self.create_tool(req).await,
            Action::CreateApiTool(req) => self.create_api_tool(req).await,
            Action::ExecuteTool(req) => self.execute_tool(req).await,
            Action::ListTools(req) => self.list_tools(req).await,
            Action::DeleteTool(req) => self.delete_tool(req).await,
            Action::ClearAll(req) => self.clear_all(req).await,
            Action::ClearTools(req) => self.clear_tools(req).await,
            Action::Reset(req) => self.reset(req).await,
            Action::Stats => Outcome::new("Vault statistics", VaultStats::collect(&self.storage)),
            Action::Export => {
                let backup = Backup::export(&self.storage);
                let message = format!(
                    "Exported {} entries and {} tools",
                    backup.entries.len(),
                    backup.tools.len()
                );
                Outcome::new(message, backup)
            }
            Action::Import(req) => {
                validate_required(&[("data", req.data.as_ref())])?;
                let data = req.data.unwrap_or(Value::Null);
                let report = self.storage.blocking(move |s| restore(s, &data)).await?;
                let message = format!(
                    "Imported {} records, skipped {}",
                    report.restored, report.skipped
                );
                Outcome::new(message, report)
            }
            Action::SyncAll => {
                let report = self.reconciler.sync_all().await?;
                let message = format!(
                    "Synced {} entries and {} tools to mirror",
                    report.entries.success, report.tools.success
                );
                Outcome::new(message, report)
            }
        }
    }

    // Entries

    async fn store(&self, req: StoreRequest) -> Result<Outcome> {
        let key = required("key", &req.key)?.to_string();
        validate_required(&[("value", req.value.as_ref())])?;
        let value = req.value.unwrap_or(Value::Null);
        let entry_type = req.entry_type.unwrap_or_default();
        let description = req.description;
        let tags = req.tags.unwrap_or_default();

        let entry = self
            .storage
            .blocking(move |s| s.entries().store(&key, value, entry_type, description, tags))
            .await?;

        let outcome = Outcome::new(format!("Stored '{}'", entry.key), &entry)?;
        match self.reconciler.mirror_for(&entry.tags) {
            Some(mirror) => {
                let sync = self.reconciler.replicate_entry(mirror, &entry).await;
                Ok(outcome.with_sync(&sync))
            }
            None => Ok(outcome),
        }
    }

    async fn retrieve(&self, req: KeyRequest) -> Result<Outcome> {
        let key = required("key", &req.key)?;

        if let Some(mirror) = self.reconciler.mirror_for(tags_of(&req.tags)) {
            if let Some(remote) = self.reconciler.retrieve_public(mirror, key).await {
                let found = Sourced {
                    record: remote,
                    source: Source::Firebase,
                };
                return Outcome::new(format!("Retrieved '{}' from mirror", key), found);
            }
        }

        let owned = key.to_string();
        match self.storage.blocking(move |s| s.entries().retrieve(&owned)).await? {
            Some(entry) => {
                let found = Sourced {
                    record: entry,
                    source: Source::Local,
                };
                Outcome::new(format!("Retrieved '{}'", key), found)
            }
            None => Outcome::new(format!("No entry found for '{}'", key), Value::Null),
        }
    }

    fn search(&self, req: SearchRequest) -> Result<Outcome> {
        let query = required("query", &req.query)?;
        let results = search::search(&self.storage, query, req.limit)?;
        let message = format!("Found {} results for '{}'", results.total_found, results.query);
        Outcome::new(message, results)
    }

    async fn list(&self, req: ListRequest) -> Result<Outcome> {
        let listing = self
            .reconciler
            .list_entries(
                is_public(tags_of(&req.tags)),
                req.page.unwrap_or(1),
                req.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            )
            .await;
        let message = format!(
            "Listed {} of {} entries",
            listing.items.len(),
            listing.pagination.total
        );
        Outcome::new(message, listing)
    }

    async fn delete(&self, req: KeyRequest) -> Result<Outcome> {
        let key = required("key", &req.key)?;
        let owned = key.to_string();
        let local = self.storage.blocking(move |s| s.entries().delete(&owned)).await?;

        let mut data = Map::new();
        data.insert("localDeleted".into(), json!(local));

        let remote = match self.reconciler.mirror_for(tags_of(&req.tags)) {
            Some(mirror) => {
                let deletion = self.reconciler.delete_public_entry(mirror, key).await;
                data.insert("firebaseDeleted".into(), json!(deletion.success));
                data.insert("firebaseMessage".into(), json!(deletion.message));
                deletion.success
            }
            None => false,
        };

        let deleted = local || remote;
        data.insert("deleted".into(), json!(deleted));
        let message = if deleted {
            format!("Deleted '{}'", key)
        } else {
            format!("Nothing to delete for '{}'", key)
        };
        Outcome::new(message, data)
    }

    async fn update(&self, req: UpdateRequest) -> Result<Outcome> {
        let key = required("key", &req.key)?.to_string();
        validate_required(&[("value", req.value.as_ref())])?;
        let value = req.value.unwrap_or(Value::Null);
        let description = req.description;
        let tags = req.tags;

        let target = key.clone();
        let entry = self
            .storage
            .blocking(move |s| s.entries().update(&target, value, description, tags))
            .await?
            .ok_or_else(|| MemvaultError::NotFound(format!("Entry '{}'", key)))?;

        let outcome = Outcome::new(format!("Updated '{}'", entry.key), &entry)?;
        match self.reconciler.mirror_for(&entry.tags) {
            Some(mirror) => {
                let sync = self.reconciler.replicate_entry(mirror, &entry).await;
                Ok(outcome.with_sync(&sync))
            }
            None => Ok(outcome),
        }
    }

    // Tools

    async fn register_tool(&self, tool: ToolDefinition, tags: &[String]) -> Result<Outcome> {
        let tool = self.storage.blocking(move |s| s.tools().create(tool)).await?;
        let outcome = Outcome::new(format!("Created tool '{}'", tool.name), &tool)?;
        match self.reconciler.mirror_for(tags) {
            Some(mirror) => {
                let sync = self.reconciler.replicate_tool(mirror, &tool).await;
                Ok(outcome.with_sync(&sync))
            }
            None => Ok(outcome),
        }
    }

    async fn create_tool(&self, req: CreateToolRequest) -> Result<Outcome> {
        let name = required("toolName", &req.tool_name)?;
        let description = required("toolDescription", &req.tool_description)?;
        let script = required("handlerCode", &req.handler_code)?;

        let tool = ToolDefinition::new(
            name,
            description,
            req.tool_type.unwrap_or_default(),
            req.parameters.clone().unwrap_or_default(),
            script,
        );
        self.register_tool(tool, tags_of(&req.tags)).await
    }

    async fn create_api_tool(&self, req: CreateApiToolRequest) -> Result<Outcome> {
        let name = required("toolName", &req.tool_name)?;
        let description = required("toolDescription", &req.tool_description)?;
        let url = required("apiUrl", &req.api_url)?;

        let mut spec = ApiToolSpec::new(name, description, url)
            .with_method(req.api_method.unwrap_or_default())
            .with_headers(req.api_headers.clone().unwrap_or_default());
        if let Some(auth) = req.api_auth.clone() {
            spec = spec.with_auth(auth);
        }
        if let Some(timeout_ms) = req.api_timeout {
            spec = spec.with_timeout_ms(timeout_ms);
        }

        self.register_tool(spec.into_tool()?, tags_of(&req.tags)).await
    }

    async fn execute_tool(&self, req: ToolRequest) -> Result<Outcome> {
        let identifier = req
            .identifier()
            .ok_or_else(|| ValidationError::Missing("toolId or toolName".to_string()))?;
        let args = req.args.clone().unwrap_or(Value::Null);

        let local_err = match self.runner.execute(identifier, args.clone()).await {
            Ok(execution) => {
                let data = json!({
                    "toolId": execution.tool.id,
                    "toolName": execution.tool.name,
                    "usageCount": execution.tool.usage_count,
                    "result": execution.result,
                    "source": Source::Local,
                });
                return Outcome::new(format!("Executed tool '{}'", execution.tool.name), data);
            }
            Err(MemvaultError::NotFound(e)) => e,
            Err(e) => return Err(e),
        };

        let Some(mirror) = self.reconciler.mirror_for(tags_of(&req.tags)) else {
            return Err(MemvaultError::NotFound(local_err));
        };

        let tool = self
            .reconciler
            .fetch_tool(mirror, identifier)
            .await
            .map_err(|remote_err| {
                MemvaultError::NotFound(format!(
                    "Tool '{}' cannot be executed (local: {}; mirror: {})",
                    identifier, local_err, remote_err
                ))
            })?;

        tracing::info!("Executing mirror tool '{}'", tool.name);
        let result = self.runner.run(&tool, args).await?;
        let data = json!({
            "toolId": tool.id,
            "toolName": tool.name,
            "result": result,
            "source": Source::Firebase,
        });
        Outcome::new(format!("Executed mirror tool '{}'", tool.name), data)
    }

    async fn list_tools(&self, req: ListRequest) -> Result<Outcome> {
        let listing = self
            .reconciler
            .list_tools(
                is_public(tags_of(&req.tags)),
                req.page.unwrap_or(1),
                req.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            )
            .await;
        let message = format!(
            "Listed {} of {} tools",
            listing.items.len(),
            listing.pagination.total
        );
        Outcome::new(message, listing)
    }

    async fn delete_tool(&self, req: ToolRequest) -> Result<Outcome> {
        let identifier = req
            .identifier()
            .ok_or_else(|| ValidationError::Missing("toolId or toolName".to_string()))?;

        let local = match self.storage.tools().get(identifier) {
            Some(tool) => self.storage.blocking(move |s| s.tools().delete(&tool.id)).await?,
            None => false,
        };

        let mut data = Map::new();
        data.insert("localDeleted".into(), json!(local));

        let remote = match self.reconciler.mirror_for(tags_of(&req.tags)) {
            Some(mirror) => {
                let deletion = self
                    .reconciler
                    .delete_public_tool(mirror, req.tool_id.as_deref(), req.tool_name.as_deref())
                    .await;
                data.insert("firebaseDeleted".into(), json!(deletion.success));
                data.insert("firebaseMessage".into(), json!(deletion.message));
                deletion.success
            }
            None => false,
        };

        let deleted = local || remote;
        data.insert("deleted".into(), json!(deleted));
        let message = if deleted {
            format!("Deleted tool '{}'", identifier)
        } else {
            format!("No tool found for '{}'", identifier)
        };
        Outcome::new(message, data)
    }

    // Bulk

    async fn clear_all(&self, req: ScopeRequest) -> Result<Outcome> {
        let cleared = self.storage.blocking(|s| s.entries().clear()).await?;
        let mut data = json!({ "cleared": cleared });

        if let Some(mirror) = self.reconciler.mirror_for(tags_of(&req.tags)) {
            data["firebase"] = serde_json::to_value(self.reconciler.clear_remote_entries(mirror).await)?;
        }
        Outcome::new(format!("Cleared {} entries", cleared), data)
    }

    async fn clear_tools(&self, req: ScopeRequest) -> Result<Outcome> {
        let cleared = self.storage.blocking(|s| s.tools().clear()).await?;
        let mut data = json!({ "cleared": cleared });

        if let Some(mirror) = self.reconciler.mirror_for(tags_of(&req.tags)) {
            data["firebase"] = serde_json::to_value(self.reconciler.clear_remote_tools(mirror).await)?;
        }
        Outcome::new(format!("Cleared {} tools", cleared), data)
    }

    async fn reset(&self, req: ScopeRequest) -> Result<Outcome> {
        let (entries, tools) = self.storage.blocking(|s| s.reset()).await?;
        let mut data = json!({ "entriesCleared": entries, "toolsCleared": tools });

        if let Some(mirror) = self.reconciler.mirror_for(tags_of(&req.tags)) {
            let (remote_entries, remote_tools) = futures::join!(
                self.reconciler.clear_remote_entries(mirror),
                self.reconciler.clear_remote_tools(mirror)
            );
            data["firebase"] = json!({ "entries": remote_entries, "tools": remote_tools });
        }
        Outcome::new(
            format!("Reset vault: {} entries and {} tools removed", entries, tools),
            data,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntryType;
    use tempfile::{tempdir, TempDir};

    fn dispatcher() -> (TempDir, Dispatcher) {
        let dir = tempdir().unwrap();
        let dispatcher = Dispatcher::open(&VaultConfig::new(dir.path())).unwrap();
        (dir, dispatcher)
    }

    #[tokio::test]
    async fn test_store_then_retrieve() {
        let (_dir, d) = dispatcher();

        let stored = d
            .dispatch_value(json!({"action": "store", "key": "user.name", "value": "Ada"}))
            .await;
        assert!(stored.success, "{}", stored.message);
        assert_eq!(stored.action, "store");
        assert!(stored.data.as_ref().unwrap().get("firebaseSync").is_none());

        let got = d
            .dispatch_value(json!({"action": "retrieve", "key": "user.name"}))
            .await;
        let data = got.data.unwrap();
        assert_eq!(data["value"], json!("Ada"));
        assert_eq!(data["accessCount"], json!(1));
        assert_eq!(data["source"], json!("local"));
    }

    #[tokio::test]
    async fn test_missing_field_names_field() {
        let (_dir, d) = dispatcher();
        let response = d.dispatch_value(json!({"action": "store", "key": "k"})).await;
        assert!(!response.success);
        assert!(response.message.starts_with("Error: "));
        assert!(response.message.contains("value is required"));
        assert_eq!(response.metadata.error_code, Some(-32602));

        let response = d.dispatch_value(json!({"action": "store", "key": "k", "value": 0})).await;
        assert!(response.success);
    }

    #[tokio::test]
    async fn test_unknown_action_is_enveloped() {
        let (_dir, d) = dispatcher();
        let response = d.dispatch_value(json!({"action": "launch"})).await;
        assert!(!response.success);
        assert_eq!(response.action, "launch");

        let response = d.dispatch_value(json!({"key": "k"})).await;
        assert!(!response.success);
        assert_eq!(response.action, "unknown");
    }

    #[tokio::test]
    async fn test_update_missing_key_does_not_create() {
        let (_dir, d) = dispatcher();
        let response = d
            .dispatch(Action::Update(UpdateRequest {
                key: Some("ghost".into()),
                value: Some(json!(1)),
                ..Default::default()
            }))
            .await;
        assert!(!response.success);
        assert!(response.message.contains("ghost"));
        assert!(d.storage().entries().get("ghost").is_none());
    }

    #[tokio::test]
    async fn test_retrieve_absent_is_null() {
        let (_dir, d) = dispatcher();
        let response = d.dispatch_value(json!({"action": "retrieve", "key": "nope"})).await;
        assert!(response.success);
        assert_eq!(response.data, Some(Value::Null));
    }

    #[tokio::test]
    async fn test_public_without_mirror_stays_local() {
        let (_dir, d) = dispatcher();
        let response = d
            .dispatch_value(json!({
                "action": "store", "key": "shared", "value": 1, "tags": ["public"]
            }))
            .await;
        assert!(response.success);
        assert!(response.data.unwrap().get("firebaseSync").is_none());

        let listing = d
            .dispatch_value(json!({"action": "list", "tags": ["public"]}))
            .await
            .data
            .unwrap();
        assert_eq!(listing["sources"]["firebase"], json!(0));
        assert_eq!(listing["items"][0]["source"], json!("local"));
    }

    #[tokio::test]
    async fn test_tool_lifecycle() {
        let (_dir, d) = dispatcher();

        let created = d
            .dispatch_value(json!({
                "action": "create_tool",
                "toolName": "remember",
                "toolDescription": "Stores its argument",
                "handlerCode": "storage.store(args.key, args.value); storage.retrieve(args.key).value"
            }))
            .await;
        assert!(created.success, "{}", created.message);
        assert_eq!(created.data.as_ref().unwrap()["type"], json!("processor"));

        let duplicate = d
            .dispatch_value(json!({
                "action": "create_tool",
                "toolName": "remember",
                "toolDescription": "again",
                "handlerCode": "1"
            }))
            .await;
        assert!(!duplicate.success);
        assert_eq!(duplicate.metadata.error_code, Some(-32006));

        let run = d
            .dispatch_value(json!({
                "action": "execute_tool",
                "toolName": "remember",
                "args": {"key": "from.script", "value": "hi"}
            }))
            .await;
        assert!(run.success, "{}", run.message);
        assert_eq!(run.data.as_ref().unwrap()["result"], json!("hi"));
        assert_eq!(
            d.storage().entries().get("from.script").unwrap().entry_type,
            EntryType::Text
        );

        let deleted = d
            .dispatch_value(json!({"action": "delete_tool", "toolName": "remember"}))
            .await;
        assert_eq!(deleted.data.unwrap()["deleted"], json!(true));
        assert!(d.storage().tools().is_empty());
    }

    #[tokio::test]
    async fn test_execute_unknown_tool_fails() {
        let (_dir, d) = dispatcher();
        let response = d
            .dispatch_value(json!({"action": "execute_tool", "toolName": "ghost"}))
            .await;
        assert!(!response.success);
        assert!(response.message.contains("ghost"));

        let response = d.dispatch_value(json!({"action": "execute_tool"})).await;
        assert!(response.message.contains("toolId or toolName is required"));
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let (_dir, d) = dispatcher();
        let response = d.dispatch_value(json!({"action": "search", "query": ""})).await;
        assert!(!response.success);
    }

    #[tokio::test]
    async fn test_sync_all_without_mirror_fails() {
        let (_dir, d) = dispatcher();
        let response = d.dispatch(Action::SyncAll).await;
        assert!(!response.success);
        assert!(response.message.contains("mirror"));
    }

    #[tokio::test]
    async fn test_reset_reports_counts() {
        let (_dir, d) = dispatcher();
        d.dispatch_value(json!({"action": "store", "key": "a", "value": 1})).await;
        d.dispatch_value(json!({"action": "store", "key": "b", "value": 2})).await;

        let response = d.dispatch(Action::Reset(ScopeRequest::default())).await;
        let data = response.data.unwrap();
        assert_eq!(data["entriesCleared"], json!(2));
        assert_eq!(data["toolsCleared"], json!(0));
        assert!(d.storage().entries().is_empty());
    }
}
