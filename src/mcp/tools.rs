//! MCP tool definitions for Memvault

use serde_json::{json, Value};

use super::protocol::McpTool;

pub const MEMVAULT_TOOL: &str = "memvault";
pub const INTRODUCTION_TOOL: &str = "memvault_introduction";
pub const EXAMPLES_TOOL: &str = "memvault_examples";

/// All tool definitions for Memvault: (name, description, input schema)
pub const TOOL_DEFINITIONS: &[(&str, &str, &str)] = &[
    (
        MEMVAULT_TOOL,
        "Persistent key/value memory plus user-defined script tools. One entry point: set `action` and the fields that action needs. Tag a request with \"public\" to mirror it to the remote store.",
        r#"{
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["store", "retrieve", "search", "list", "delete", "update", "create_tool", "create_api_tool", "execute_tool", "list_tools", "delete_tool", "clear_all", "clear_tools", "reset", "stats", "export", "import", "sync_all"]
                },
                "key": {"type": "string", "description": "Entry key: letters, digits, _ . - (max 100)"},
                "value": {"description": "Any JSON value to store"},
                "type": {"type": "string", "enum": ["text", "json", "list", "counter", "custom"], "default": "text"},
                "description": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}, "description": "Include \"public\" to involve the mirror"},
                "query": {"type": "string", "description": "Search text"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 100},
                "page": {"type": "integer", "minimum": 1, "default": 1},
                "toolName": {"type": "string", "description": "Tool name: letters, digits, _ - (max 50)"},
                "toolId": {"type": "string"},
                "toolDescription": {"type": "string"},
                "toolType": {"type": "string", "enum": ["storage", "retrieval", "processor", "analyzer"], "default": "processor"},
                "parameters": {"type": "object", "description": "Declared argument schema (informational)"},
                "handlerCode": {"type": "string", "description": "Rhai script; sees `args`, `storage` and `generate_id()`; its last value is the result"},
                "args": {"type": "object", "description": "Arguments for execute_tool"},
                "apiUrl": {"type": "string"},
                "apiMethod": {"type": "string", "enum": ["GET", "POST", "PUT", "DELETE", "PATCH"], "default": "GET"},
                "apiHeaders": {"type": "object"},
                "apiAuth": {"type": "object", "description": "{type: bearer|basic|api-key, token?, username?, password?, apiKey?, apiKeyHeader?}"},
                "apiTimeout": {"type": "integer", "description": "Milliseconds, capped at 30000"},
                "data": {"description": "Backup document (or its JSON text) for import"}
            },
            "required": ["action"]
        }"#,
    ),
    (
        INTRODUCTION_TOOL,
        "Overview of what Memvault stores and how to call it",
        r#"{"type": "object", "properties": {}}"#,
    ),
    (
        EXAMPLES_TOOL,
        "Example requests for every action, including complete tool scripts",
        r#"{"type": "object", "properties": {}}"#,
    ),
];

/// Get all tool definitions as McpTool structs
pub fn get_tool_definitions() -> Vec<McpTool> {
    TOOL_DEFINITIONS
        .iter()
        .map(|(name, description, schema)| McpTool {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: serde_json::from_str(schema).unwrap_or(json!({})),
        })
        .collect()
}

pub const INTRODUCTION: &str = r#"# Memvault

Memvault keeps two collections on local disk:

- **Entries**: JSON values stored under a unique key. Retrieval counts accesses.
- **Tools**: named Rhai scripts you can run on demand. A script sees `args`
  (the call arguments), `storage` (store / retrieve / update / delete /
  search over entries) and `generate_id()`. Its last expression is the result.

`create_api_tool` builds a tool that calls an HTTP endpoint; at call time
pass `body`, `params`, `customHeaders` or `customAuth` to override defaults.

Requests tagged `public` also reach the remote mirror when one is
configured: writes are replicated (failures are reported, never fatal),
listings are merged with mirror records winning on conflicts, and
`execute_tool` falls back to mirror tools that are missing locally.

Every call returns `{success, action, message, data, timestamp, metadata}`.
Call `memvault_examples` for ready-to-use requests."#;

const NOTEKEEPER_SCRIPT: &str = r#"switch args.action {
    "add" => {
        let id = generate_id();
        storage.store("note." + id, #{ title: args.title, content: args.content }, "json");
        #{ saved: true, id: id }
    }
    "get" => {
        let entry = storage.retrieve("note." + args.id);
        if entry == () { #{ error: "note not found" } } else { entry.value }
    }
    "list" => storage.search("note", 50).map(|e| e.value),
    "delete" => #{ deleted: storage.delete("note." + args.id) },
    _ => #{ error: "unknown action: " + args.action }
}"#;

const COUNTER_SCRIPT: &str = r#"let key = "counter." + args.name;
let current = storage.retrieve(key);
let next = if current == () { 1 } else { current.value + 1 };
storage.store(key, next, "counter");
next"#;

/// Example requests, one per action
pub fn examples() -> Value {
    json!({
        "entries": {
            "store": {"action": "store", "key": "user.preferences", "value": {"theme": "dark"}, "type": "json", "tags": ["settings"]},
            "retrieve": {"action": "retrieve", "key": "user.preferences"},
            "update": {"action": "update", "key": "user.preferences", "value": {"theme": "light"}},
            "search": {"action": "search", "query": "preferences", "limit": 5},
            "list": {"action": "list", "page": 1, "limit": 20},
            "delete": {"action": "delete", "key": "user.preferences"},
            "store_public": {"action": "store", "key": "team.roadmap", "value": "Q3 goals", "tags": ["public"]}
        },
        "tools": {
            "create_tool": {
                "action": "create_tool",
                "toolName": "notekeeper",
                "toolDescription": "Add, get, list and delete notes",
                "toolType": "storage",
                "parameters": {
                    "action": {"type": "string", "enum": ["add", "get", "list", "delete"]},
                    "title": {"type": "string", "optional": true},
                    "content": {"type": "string", "optional": true},
                    "id": {"type": "string", "optional": true}
                },
                "handlerCode": NOTEKEEPER_SCRIPT
            },
            "counter_tool": {
                "action": "create_tool",
                "toolName": "counter",
                "toolDescription": "Increment a named counter",
                "handlerCode": COUNTER_SCRIPT
            },
            "execute_tool": {"action": "execute_tool", "toolName": "notekeeper", "args": {"action": "add", "title": "Standup", "content": "Ship the release"}},
            "create_api_tool": {
                "action": "create_api_tool",
                "toolName": "weather",
                "toolDescription": "Current weather for a city",
                "apiUrl": "https://api.example.com/weather",
                "apiMethod": "GET",
                "apiAuth": {"type": "api-key", "apiKey": "YOUR_KEY", "apiKeyHeader": "X-API-Key"},
                "apiTimeout": 8000
            },
            "execute_api_tool": {"action": "execute_tool", "toolName": "weather", "args": {"params": {"city": "Hanoi"}}},
            "list_tools": {"action": "list_tools"},
            "delete_tool": {"action": "delete_tool", "toolName": "counter"}
        },
        "maintenance": {
            "stats": {"action": "stats"},
            "export": {"action": "export"},
            "import": {"action": "import", "data": {"entries": [{"key": "restored.note", "value": "hello"}], "tools": []}},
            "sync_all": {"action": "sync_all"},
            "clear_tools": {"action": "clear_tools"},
            "clear_all": {"action": "clear_all"},
            "reset": {"action": "reset"}
        }
    })
}
