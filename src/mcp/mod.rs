//! MCP (Model Context Protocol) server implementation
//!
//! JSON-RPC over stdio. The vault is exposed as one universal `memvault`
//! tool plus two static help tools.

pub mod handler;
pub mod protocol;
pub mod tools;

pub use handler::VaultHandler;
pub use protocol::{
    methods, InitializeResult, McpHandler, McpRequest, McpResponse, McpServer, McpTool,
    ToolCallResult,
};
pub use tools::{examples, get_tool_definitions, INTRODUCTION, TOOL_DEFINITIONS};
