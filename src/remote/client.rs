//! HTTP client for the remote mirror
//!
//! The mirror exposes `/api/memory[/:id]` and `/api/tools[/:id]`, each
//! answering `{success, data, count?, message?}`. The mirror assigns its own
//! ids, so local and remote ids for the same record differ.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::{MemvaultError, Result};
use crate::types::{MemoryEntry, MirrorConfig, ToolDefinition};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
}

/// Client for one mirror base URL
#[derive(Clone)]
pub struct MirrorClient {
    client: reqwest::Client,
    config: MirrorConfig,
}

impl MirrorClient {
    pub fn new(config: MirrorConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn exchange(request: reqwest::RequestBuilder) -> Result<Option<Value>> {
        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MemvaultError::RemoteSync(format!("Status {}: {}", status, body)));
        }

        let envelope: Envelope = response.json().await.map_err(|e| {
            MemvaultError::RemoteSync(format!("Failed to parse mirror response: {}", e))
        })?;

        if !envelope.success {
            return Err(MemvaultError::RemoteSync(
                envelope
                    .message
                    .unwrap_or_else(|| "mirror reported failure".to_string()),
            ));
        }

        Ok(Some(envelope.data))
    }

    /// Send a request with the configured deadline and unwrap the envelope.
    /// `Ok(None)` means the mirror answered 404.
    async fn call(&self, request: reqwest::RequestBuilder) -> Result<Option<Value>> {
        let timeout_ms = self.config.timeout_ms;
        tokio::time::timeout(Duration::from_millis(timeout_ms), Self::exchange(request))
            .await
            .map_err(|_| MemvaultError::Timeout(timeout_ms))?
    }

    async fn required(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        self.call(request)
            .await?
            .ok_or_else(|| MemvaultError::NotFound(format!("{} on mirror", what)))
    }

    /// Records that fail to decode are skipped with a warning
    fn decode_list<T: DeserializeOwned>(data: Value, kind: &str) -> Vec<T> {
        let items = match data {
            Value::Array(items) => items,
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            _ => Vec::new(),
        };

        items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed mirror {}: {}", kind, e);
                    None
                }
            })
            .collect()
    }

    // Entries

    pub async fn list_entries(&self) -> Result<Vec<MemoryEntry>> {
        let data = self
            .required(self.client.get(self.url("/api/memory")), "memory collection")
            .await?;
        Ok(Self::decode_list(data, "entry"))
    }

    /// Find the mirror copy of `key`
    pub async fn find_entry(&self, key: &str) -> Result<Option<MemoryEntry>> {
        Ok(self.list_entries().await?.into_iter().find(|e| e.key == key))
    }

    fn entry_payload(entry: &MemoryEntry) -> Value {
        json!({
            "key": entry.key,
            "value": entry.value,
            "type": entry.entry_type,
            "description": entry.description,
            "tags": entry.tags,
        })
    }

    pub async fn create_entry(&self, entry: &MemoryEntry) -> Result<MemoryEntry> {
        let request = self
            .client
            .post(self.url("/api/memory"))
            .json(&Self::entry_payload(entry));
        let data = self.required(request, "memory collection").await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn update_entry(&self, remote_id: &str, entry: &MemoryEntry) -> Result<MemoryEntry> {
        let request = self
            .client
            .put(self.url(&format!("/api/memory/{}", remote_id)))
            .json(&Self::entry_payload(entry));
        let data = self.required(request, &format!("memory {}", remote_id)).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// Returns false when the mirror has no such record
    pub async fn delete_entry(&self, remote_id: &str) -> Result<bool> {
        let request = self
            .client
            .delete(self.url(&format!("/api/memory/{}", remote_id)));
        Ok(self.call(request).await?.is_some())
    }

    // Tools

    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let data = self
            .required(self.client.get(self.url("/api/tools")), "tool collection")
            .await?;
        Ok(Self::decode_list(data, "tool"))
    }

    pub async fn get_tool(&self, remote_id: &str) -> Result<Option<ToolDefinition>> {
        let request = self
            .client
            .get(self.url(&format!("/api/tools/{}", remote_id)));
        match self.call(request).await? {
            Some(data) => Ok(Some(serde_json::from_value(data)?)),
            None => Ok(None),
        }
    }

    fn tool_payload(tool: &ToolDefinition) -> Value {
        json!({
            "name": tool.name,
            "description": tool.description,
            "type": tool.tool_type,
            "parameters": tool.parameters,
            "handlerCode": tool.handler_script,
        })
    }

    pub async fn create_tool(&self, tool: &ToolDefinition) -> Result<ToolDefinition> {
        let request = self
            .client
            .post(self.url("/api/tools"))
            .json(&Self::tool_payload(tool));
        let data = self.required(request, "tool collection").await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn update_tool(&self, remote_id: &str, tool: &ToolDefinition) -> Result<ToolDefinition> {
        let request = self
            .client
            .put(self.url(&format!("/api/tools/{}", remote_id)))
            .json(&Self::tool_payload(tool));
        let data = self.required(request, &format!("tool {}", remote_id)).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn delete_tool(&self, remote_id: &str) -> Result<bool> {
        let request = self
            .client
            .delete(self.url(&format!("/api/tools/{}", remote_id)));
        Ok(self.call(request).await?.is_some())
    }
}
