//! Core types for Memvault

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// Opaque identifier for entries and tools
pub type RecordId = String;

/// Default number of search results
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Hard cap on search results
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Default page size for listings
pub const DEFAULT_PAGE_LIMIT: usize = 10;

/// Default timeout for remote and API-tool HTTP calls
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Upper bound accepted for any configured timeout
pub const MAX_TIMEOUT_MS: u64 = 30_000;

/// Tag that routes a request through the remote mirror
pub const PUBLIC_TAG: &str = "public";

/// Snapshot file holding all entries
pub const ENTRIES_FILE: &str = "entries.json";

/// Snapshot file holding all tools
pub const TOOLS_FILE: &str = "tools.json";

/// Generate a fresh opaque record id
pub fn generate_id() -> RecordId {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Kind of value held by an entry. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    #[default]
    Text,
    Json,
    List,
    Counter,
    Custom,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Text => "text",
            EntryType::Json => "json",
            EntryType::List => "list",
            EntryType::Counter => "counter",
            EntryType::Custom => "custom",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(EntryType::Text),
            "json" => Ok(EntryType::Json),
            "list" => Ok(EntryType::List),
            "counter" => Ok(EntryType::Counter),
            "custom" => Ok(EntryType::Custom),
            _ => Err(format!("Unknown entry type: {}", s)),
        }
    }
}

/// Role of a tool. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Storage,
    Retrieval,
    #[default]
    Processor,
    Analyzer,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::Storage => "storage",
            ToolType::Retrieval => "retrieval",
            ToolType::Processor => "processor",
            ToolType::Analyzer => "analyzer",
        }
    }
}

impl std::fmt::Display for ToolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "storage" => Ok(ToolType::Storage),
            "retrieval" => Ok(ToolType::Retrieval),
            "processor" => Ok(ToolType::Processor),
            "analyzer" => Ok(ToolType::Analyzer),
            _ => Err(format!("Unknown tool type: {}", s)),
        }
    }
}

/// A key/value memory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    /// Opaque unique token
    pub id: RecordId,
    /// Unique, human-chosen lookup key
    pub key: String,
    /// Arbitrary structured value
    #[serde(default)]
    pub value: Value,
    #[serde(rename = "type", default)]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Tags in insertion order
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    /// Incremented on every retrieval
    #[serde(default)]
    pub access_count: u64,
    #[serde(default = "Utc::now")]
    pub last_accessed: DateTime<Utc>,
}

impl MemoryEntry {
    /// Build a brand new entry with fresh timestamps and zeroed stats
    pub fn new(
        key: impl Into<String>,
        value: Value,
        entry_type: EntryType,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            key: key.into(),
            value,
            entry_type,
            description,
            tags,
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed: now,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A user-authored script plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Primary key
    pub id: RecordId,
    /// Unique secondary key
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub tool_type: ToolType,
    /// Declarative argument schema; not enforced at call time
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Script source
    #[serde(rename = "handlerCode", alias = "handlerScript", default)]
    pub handler_script: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Incremented on every execution
    #[serde(default)]
    pub usage_count: u64,
    /// Grants the `fetch` capability (set for API tools)
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub network_access: bool,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tool_type: ToolType,
        parameters: Map<String, Value>,
        handler_script: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            name: name.into(),
            description: description.into(),
            tool_type,
            parameters,
            handler_script: handler_script.into(),
            created_at: Utc::now(),
            usage_count: 0,
            network_access: false,
        }
    }

    pub fn with_network_access(mut self) -> Self {
        self.network_access = true;
        self
    }
}

/// HTTP methods an API tool may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Whether a request body is sent for this method
    pub fn carries_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            "PATCH" => Ok(HttpMethod::Patch),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(format!("Unknown HTTP method: {}", s)),
        }
    }
}

/// Authentication scheme for API tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthType {
    Bearer,
    Basic,
    ApiKey,
}

/// Authentication descriptor for API tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAuth {
    #[serde(rename = "type")]
    pub auth_type: AuthType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_header: Option<String>,
}

/// Where a listed record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Local,
    Firebase,
}

/// A record tagged with its origin in a merged listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sourced<T> {
    #[serde(flatten)]
    pub record: T,
    pub source: Source,
}

/// Remote mirror settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Base URL, e.g. `http://localhost:3001`
    pub base_url: String,
    /// Deadline for each remote call
    pub timeout_ms: u64,
}

impl MirrorConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms.clamp(1, MAX_TIMEOUT_MS);
        self
    }
}

/// Resource bounds for the script engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 1_000_000,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1 << 20,
            max_array_size: 10_000,
            max_map_size: 10_000,
        }
    }
}

/// Top-level vault configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    /// Directory holding the snapshot files
    pub data_dir: PathBuf,
    /// Optional remote mirror
    pub mirror: Option<MirrorConfig>,
    pub sandbox: SandboxLimits,
}

impl VaultConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            mirror: None,
            sandbox: SandboxLimits::default(),
        }
    }

    pub fn with_mirror(mut self, mirror: MirrorConfig) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn entries_path(&self) -> PathBuf {
        self.data_dir.join(ENTRIES_FILE)
    }

    pub fn tools_path(&self) -> PathBuf {
        self.data_dir.join(TOOLS_FILE)
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .map(|d| d.join("memvault"))
            .unwrap_or_else(|| PathBuf::from("memvault-data"));
        Self::new(data_dir)
    }
}
