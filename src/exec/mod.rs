//! Tool execution
//!
//! Resolves a tool through the tool store, records the use, and runs its
//! script in a [`Sandbox`] on the blocking pool.

mod api_tool;
mod fetch;
mod sandbox;

pub use api_tool::{api_tool_parameters, default_headers, rhai_literal, ApiToolSpec};
pub use fetch::{FetchRequest, FetchResponse};
pub use sandbox::{FetchCapability, Sandbox, ScriptStorage};

use serde::Serialize;
use serde_json::Value;

use crate::error::{MemvaultError, Result};
use crate::storage::Storage;
use crate::types::{SandboxLimits, ToolDefinition};

/// Outcome of a successful execution
#[derive(Debug, Clone, Serialize)]
pub struct Execution {
    pub tool: ToolDefinition,
    pub result: Value,
}

/// Runs tools against a storage handle
#[derive(Clone)]
pub struct ToolRunner {
    storage: Storage,
    limits: SandboxLimits,
    client: reqwest::Client,
}

impl ToolRunner {
    pub fn new(storage: Storage, limits: SandboxLimits) -> Self {
        Self {
            storage,
            limits,
            client: reqwest::Client::new(),
        }
    }

    /// Resolve `identifier` (id or name) locally, bump its usage count and run it
    pub async fn execute(&self, identifier: &str, args: Value) -> Result<Execution> {
        let tool = self
            .storage
            .tools()
            .get(identifier)
            .ok_or_else(|| MemvaultError::NotFound(format!("Tool '{}' not found", identifier)))?;

        let id = tool.id.clone();
        let tool = self
            .storage
            .blocking(move |s| s.tools().record_usage(&id))
            .await?
            .unwrap_or(tool);
        tracing::info!("Executing tool '{}' (use #{})", tool.name, tool.usage_count);

        let result = self.run(&tool, args).await?;
        Ok(Execution { tool, result })
    }

    /// Run a tool definition that is not necessarily in the local store
    pub async fn run(&self, tool: &ToolDefinition, args: Value) -> Result<Value> {
        let mut sandbox = Sandbox::new(self.storage.clone(), self.limits);
        if tool.network_access {
            sandbox = sandbox.with_fetch(FetchCapability::new(
                self.client.clone(),
                tokio::runtime::Handle::current(),
            ));
        }

        let name = tool.name.clone();
        let script = tool.handler_script.clone();
        let result = tokio::task::spawn_blocking(move || sandbox.run(&name, &script, args))
            .await
            .map_err(|e| MemvaultError::Internal(format!("script task failed: {}", e)))?;

        if let Err(e) = &result {
            tracing::warn!("{}", e);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolType, VaultConfig};
    use serde_json::{json, Map};
    use tempfile::{tempdir, TempDir};

    fn runner() -> (TempDir, Storage, ToolRunner) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(&VaultConfig::new(dir.path())).unwrap();
        let runner = ToolRunner::new(storage.clone(), SandboxLimits::default());
        (dir, storage, runner)
    }

    #[tokio::test]
    async fn test_execute_by_name_counts_usage() {
        let (_dir, storage, runner) = runner();
        let tool = storage
            .tools()
            .create(ToolDefinition::new(
                "double",
                "Doubles n",
                ToolType::Processor,
                Map::new(),
                "args.n * 2",
            ))
            .unwrap();

        let first = runner.execute("double", json!({"n": 21})).await.unwrap();
        assert_eq!(first.result, json!(42));
        assert_eq!(first.tool.usage_count, 1);

        let second = runner.execute(&tool.id, json!({"n": 1})).await.unwrap();
        assert_eq!(second.result, json!(2));
        assert_eq!(storage.tools().get(&tool.id).unwrap().usage_count, 2);
    }

    #[tokio::test]
    async fn test_missing_tool_is_not_found() {
        let (_dir, _storage, runner) = runner();
        let err = runner.execute("nothing", json!({})).await.unwrap_err();
        assert!(matches!(err, MemvaultError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failing_script_still_counts_usage() {
        let (_dir, storage, runner) = runner();
        storage
            .tools()
            .create(ToolDefinition::new(
                "fails",
                "Always throws",
                ToolType::Analyzer,
                Map::new(),
                r#"throw "nope""#,
            ))
            .unwrap();

        let err = runner.execute("fails", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("fails"));
        assert_eq!(storage.tools().get("fails").unwrap().usage_count, 1);
    }
}
