//! MCP handler backed by a [`Dispatcher`]

use serde_json::{json, Value};
use tokio::runtime::Handle;

use super::protocol::{methods, InitializeResult, McpHandler, McpRequest, McpResponse, ToolCallResult};
use super::tools::{examples, get_tool_definitions, EXAMPLES_TOOL, INTRODUCTION, INTRODUCTION_TOOL, MEMVAULT_TOOL};
use crate::dispatch::Dispatcher;

/// Answers MCP requests by driving the dispatcher on a tokio runtime.
///
/// `handle_request` blocks on the runtime, so it must be called from a
/// thread that is not itself running async code.
pub struct VaultHandler {
    dispatcher: Dispatcher,
    runtime: Handle,
}

impl VaultHandler {
    pub fn new(dispatcher: Dispatcher, runtime: Handle) -> Self {
        Self { dispatcher, runtime }
    }

    fn handle_tool_call(&self, name: &str, arguments: Value) -> Option<ToolCallResult> {
        match name {
            MEMVAULT_TOOL => {
                let response = self.runtime.block_on(self.dispatcher.dispatch_value(arguments));
                Some(ToolCallResult::json(&response).mark_error(!response.success))
            }
            INTRODUCTION_TOOL => Some(ToolCallResult::text(INTRODUCTION)),
            EXAMPLES_TOOL => Some(ToolCallResult::json(&examples())),
            _ => None,
        }
    }
}

impl McpHandler for VaultHandler {
    fn handle_request(&self, request: McpRequest) -> McpResponse {
        match request.method.as_str() {
            methods::INITIALIZE => {
                let result = InitializeResult::default();
                McpResponse::success(request.id, json!(result))
            }
            methods::INITIALIZED => McpResponse::success(request.id, json!({})),
            methods::LIST_TOOLS => {
                let tools = get_tool_definitions();
                McpResponse::success(request.id, json!({ "tools": tools }))
            }
            methods::CALL_TOOL => {
                let name = request
                    .params
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let arguments = request
                    .params
                    .get("arguments")
                    .cloned()
                    .unwrap_or(json!({}));

                match self.handle_tool_call(name, arguments) {
                    Some(result) => McpResponse::success(request.id, json!(result)),
                    None => McpResponse::error(request.id, -32602, format!("Unknown tool: {}", name)),
                }
            }
            _ => McpResponse::error(
                request.id,
                -32601,
                format!("Method not found: {}", request.method),
            ),
        }
    }
}
