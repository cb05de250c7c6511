//! Typed action requests
//!
//! The wire format is one flat JSON object tagged by `action`. Each variant
//! reads only the fields it uses; everything else is ignored. Fields the
//! action requires are still `Option` so that absence is reported as a
//! validation failure naming the field rather than a decode error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{ApiAuth, EntryType, HttpMethod, ToolType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRequest {
    pub key: Option<String>,
    pub value: Option<Value>,
    #[serde(rename = "type")]
    pub entry_type: Option<EntryType>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyRequest {
    pub key: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub key: Option<String>,
    pub value: Option<Value>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    pub tags: Option<Vec<String>>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateToolRequest {
    pub tool_name: Option<String>,
    pub tool_description: Option<String>,
    pub tool_type: Option<ToolType>,
    pub parameters: Option<Map<String, Value>>,
    pub handler_code: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiToolRequest {
    pub tool_name: Option<String>,
    pub tool_description: Option<String>,
    pub api_url: Option<String>,
    pub api_method: Option<HttpMethod>,
    pub api_headers: Option<Map<String, Value>>,
    pub api_auth: Option<ApiAuth>,
    pub api_timeout: Option<u64>,
    pub tags: Option<Vec<String>>,
}

/// Addresses a tool by id or name; shared by execute and delete
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolRequest {
    pub tool_id: Option<String>,
    pub tool_name: Option<String>,
    pub args: Option<Value>,
    pub tags: Option<Vec<String>>,
}

impl ToolRequest {
    /// Id wins over name when both are given
    pub fn identifier(&self) -> Option<&str> {
        self.tool_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.tool_name.as_deref().filter(|s| !s.is_empty()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeRequest {
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    /// A backup document, or its JSON text
    pub data: Option<Value>,
}

/// Every action the vault understands
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Store(StoreRequest),
    Retrieve(KeyRequest),
    Search(SearchRequest),
    List(ListRequest),
    Delete(KeyRequest),
    Update(UpdateRequest),
    CreateTool(CreateToolRequest),
    CreateApiTool(CreateApiToolRequest),
    ExecuteTool(ToolRequest),
    ListTools(ListRequest),
    DeleteTool(ToolRequest),
    ClearAll(ScopeRequest),
    ClearTools(ScopeRequest),
    Reset(ScopeRequest),
    Stats,
    Export,
    Import(ImportRequest),
    SyncAll,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Store(_) => "store",
            Action::Retrieve(_) => "retrieve",
            Action::Search(_) => "search",
            Action::List(_) => "list",
            Action::Delete(_) => "delete",
            Action::Update(_) => "update",
            Action::CreateTool(_) => "create_tool",
            Action::CreateApiTool(_) => "create_api_tool",
            Action::ExecuteTool(_) => "execute_tool",
            Action::ListTools(_) => "list_tools",
            Action::DeleteTool(_) => "delete_tool",
            Action::ClearAll(_) => "clear_all",
            Action::ClearTools(_) => "clear_tools",
            Action::Reset(_) => "reset",
            Action::Stats => "stats",
            Action::Export => "export",
            Action::Import(_) => "import",
            Action::SyncAll => "sync_all",
        }
    }

    /// All action names, in documentation order
    pub const NAMES: &'static [&'static str] = &[
        "store",
        "retrieve",
        "search",
        "list",
        "delete",
        "update",
        "create_tool",
        "create_api_tool",
        "execute_tool",
        "list_tools",
        "delete_tool",
        "clear_all",
        "clear_tools",
        "reset",
        "stats",
        "export",
        "import",
        "sync_all",
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_envelope_decodes_to_variant() {
        let action: Action = serde_json::from_value(json!({
            "action": "store",
            "key": "k",
            "value": {"a": 1},
            "type": "json",
            "query": "ignored by store"
        }))
        .unwrap();

        match action {
            Action::Store(req) => {
                assert_eq!(req.key.as_deref(), Some("k"));
                assert_eq!(req.entry_type, Some(EntryType::Json));
                assert!(req.tags.is_none());
            }
            other => panic!("decoded as {}", other.name()),
        }
    }

    #[test]
    fn test_unit_actions_decode() {
        let action: Action = serde_json::from_value(json!({"action": "stats"})).unwrap();
        assert_eq!(action.name(), "stats");
        let action: Action =
            serde_json::from_value(json!({"action": "sync_all", "tags": ["public"]})).unwrap();
        assert_eq!(action.name(), "sync_all");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let result: Result<Action, _> = serde_json::from_value(json!({"action": "explode"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_tool_identifier_prefers_id() {
        let req = ToolRequest {
            tool_id: Some("abc".into()),
            tool_name: Some("name".into()),
            ..Default::default()
        };
        assert_eq!(req.identifier(), Some("abc"));

        let req = ToolRequest {
            tool_id: Some(String::new()),
            tool_name: Some("name".into()),
            ..Default::default()
        };
        assert_eq!(req.identifier(), Some("name"));
        assert_eq!(ToolRequest::default().identifier(), None);
    }

    #[test]
    fn test_api_auth_decodes_kebab_type() {
        let action: Action = serde_json::from_value(json!({
            "action": "create_api_tool",
            "toolName": "weather",
            "apiUrl": "https://api.example.com",
            "apiMethod": "POST",
            "apiAuth": {"type": "api-key", "apiKey": "secret"}
        }))
        .unwrap();

        match action {
            Action::CreateApiTool(req) => {
                assert_eq!(req.api_method, Some(HttpMethod::Post));
                assert_eq!(req.api_auth.unwrap().api_key.as_deref(), Some("secret"));
            }
            other => panic!("decoded as {}", other.name()),
        }
    }

    #[test]
    fn test_names_cover_every_variant() {
        assert_eq!(Action::NAMES.len(), 18);
        assert!(Action::NAMES.contains(&Action::Export.name()));
    }
}
