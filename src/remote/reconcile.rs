//! Local/remote reconciliation
//!
//! Remote records win in merged reads; local writes stand when replication
//! fails. Nothing here holds state beyond the storage handle and the client.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use super::client::MirrorClient;
use crate::error::{MemvaultError, Result};
use crate::storage::{creation_order, recency_order, Storage};
use crate::types::{
    MemoryEntry, Source, Sourced, ToolDefinition, DEFAULT_PAGE_LIMIT, PUBLIC_TAG,
};

/// Whether a request's tags route it through the mirror
pub fn is_public(tags: &[String]) -> bool {
    tags.iter().any(|t| t == PUBLIC_TAG)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// How many records each side contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub local: usize,
    pub firebase: usize,
    pub combined: usize,
}

/// One page of a (possibly merged) listing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
    pub sources: SourceCounts,
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_error: Option<String>,
}

/// Slice out one page. Page numbers start at 1; zero page or limit fall
/// back to the defaults.
pub fn paginate<T>(items: Vec<T>, page: usize, limit: usize) -> (Vec<T>, Pagination) {
    let page = page.max(1);
    let limit = if limit == 0 { DEFAULT_PAGE_LIMIT } else { limit };
    let total = items.len();
    let total_pages = total.div_ceil(limit);
    let offset = (page - 1).saturating_mul(limit);

    let items = items.into_iter().skip(offset).take(limit).collect();
    let pagination = Pagination {
        page,
        limit,
        total,
        total_pages,
        has_next: page < total_pages,
        has_prev: page > 1,
    };
    (items, pagination)
}

/// Merge by key, remote copy winning, ordered by recency
pub fn merge_entries(local: Vec<MemoryEntry>, remote: Vec<MemoryEntry>) -> Vec<Sourced<MemoryEntry>> {
    let mut merged: HashMap<String, Sourced<MemoryEntry>> = HashMap::new();

    for record in local {
        merged.insert(record.key.clone(), Sourced { record, source: Source::Local });
    }
    for record in remote {
        merged.insert(record.key.clone(), Sourced { record, source: Source::Firebase });
    }

    let mut merged: Vec<_> = merged.into_values().collect();
    merged.sort_by(|a, b| recency_order(&a.record, &b.record));
    merged
}

/// Merge tools; a local tool is dropped when the mirror has one with the same
/// id or the same name
pub fn merge_tools(local: Vec<ToolDefinition>, remote: Vec<ToolDefinition>) -> Vec<Sourced<ToolDefinition>> {
    let remote_ids: HashSet<String> = remote.iter().map(|t| t.id.clone()).collect();
    let remote_names: HashSet<String> = remote.iter().map(|t| t.name.clone()).collect();

    let mut merged: Vec<Sourced<ToolDefinition>> = Vec::with_capacity(remote.len() + local.len());
    let mut seen_ids = HashSet::new();
    for record in remote {
        if seen_ids.insert(record.id.clone()) {
            merged.push(Sourced { record, source: Source::Firebase });
        }
    }
    for record in local {
        if !remote_ids.contains(&record.id) && !remote_names.contains(&record.name) {
            merged.push(Sourced { record, source: Source::Local });
        }
    }

    merged.sort_by(|a, b| creation_order(&a.record, &b.record));
    merged
}

/// Result of pushing one record to the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub firebase_sync: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firebase_error: Option<String>,
}

impl SyncOutcome {
    fn from_result<T>(result: Result<T>) -> Self {
        match result {
            Ok(_) => Self {
                firebase_sync: true,
                firebase_error: None,
            },
            Err(e) => {
                tracing::warn!("Mirror replication failed: {}", e);
                Self {
                    firebase_sync: false,
                    firebase_error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Result of deleting a record's mirror copy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteDeletion {
    pub success: bool,
    pub message: String,
}

/// Per-item accounting for bulk remote operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl BulkOutcome {
    fn record(&mut self, label: &str, result: Result<()>) {
        match result {
            Ok(()) => self.success += 1,
            Err(e) => {
                self.failed += 1;
                self.errors.push(format!("{}: {}", label, e));
            }
        }
    }
}

/// Per-collection accounting for `sync_all`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncAllReport {
    pub entries: BulkOutcome,
    pub tools: BulkOutcome,
}

/// Merges the local stores with the optional mirror
#[derive(Clone)]
pub struct Reconciler {
    storage: Storage,
    mirror: Option<MirrorClient>,
}

impl Reconciler {
    pub fn new(storage: Storage, mirror: Option<MirrorClient>) -> Self {
        Self { storage, mirror }
    }

    pub fn mirror(&self) -> Option<&MirrorClient> {
        self.mirror.as_ref()
    }

    /// The mirror client, when `tags` make the request public
    pub fn mirror_for(&self, tags: &[String]) -> Option<&MirrorClient> {
        self.mirror.as_ref().filter(|_| is_public(tags))
    }

    fn require_mirror(&self) -> Result<&MirrorClient> {
        self.mirror
            .as_ref()
            .ok_or_else(|| MemvaultError::Config("no remote mirror configured".to_string()))
    }

    async fn push_entry(mirror: &MirrorClient, entry: &MemoryEntry) -> Result<()> {
        match mirror.find_entry(&entry.key).await? {
            Some(existing) => mirror.update_entry(&existing.id, entry).await.map(|_| ()),
            None => mirror.create_entry(entry).await.map(|_| ()),
        }
    }

    /// Push an entry written locally. Never fails the local write.
    pub async fn replicate_entry(&self, mirror: &MirrorClient, entry: &MemoryEntry) -> SyncOutcome {
        SyncOutcome::from_result(Self::push_entry(mirror, entry).await)
    }

    /// Push a tool created locally. Never fails the local write.
    pub async fn replicate_tool(&self, mirror: &MirrorClient, tool: &ToolDefinition) -> SyncOutcome {
        SyncOutcome::from_result(mirror.create_tool(tool).await)
    }

    /// Mirror copy of `key`, or `None` on absence or any remote failure
    pub async fn retrieve_public(&self, mirror: &MirrorClient, key: &str) -> Option<MemoryEntry> {
        match mirror.find_entry(key).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Mirror lookup for '{}' failed: {}", key, e);
                None
            }
        }
    }

    pub async fn delete_public_entry(&self, mirror: &MirrorClient, key: &str) -> RemoteDeletion {
        let outcome = async {
            match mirror.find_entry(key).await? {
                Some(remote) => Ok::<bool, MemvaultError>(mirror.delete_entry(&remote.id).await?),
                None => Ok(false),
            }
        };

        match outcome.await {
            Ok(true) => RemoteDeletion {
                success: true,
                message: "Deleted from mirror".to_string(),
            },
            Ok(false) => RemoteDeletion {
                success: false,
                message: "Not found on mirror".to_string(),
            },
            Err(e) => RemoteDeletion {
                success: false,
                message: format!("Mirror delete failed: {}", e),
            },
        }
    }

    /// Delete the mirror tool matching either `id` or `name`
    pub async fn delete_public_tool(
        &self,
        mirror: &MirrorClient,
        id: Option<&str>,
        name: Option<&str>,
    ) -> RemoteDeletion {
        let outcome = async {
            let tools = mirror.list_tools().await?;
            let found = tools
                .into_iter()
                .find(|t| Some(t.id.as_str()) == id || Some(t.name.as_str()) == name);
            match found {
                Some(remote) => Ok::<bool, MemvaultError>(mirror.delete_tool(&remote.id).await?),
                None => Ok(false),
            }
        };

        match outcome.await {
            Ok(true) => RemoteDeletion {
                success: true,
                message: "Deleted tool from mirror".to_string(),
            },
            Ok(false) => RemoteDeletion {
                success: false,
                message: "Tool not found on mirror".to_string(),
            },
            Err(e) => RemoteDeletion {
                success: false,
                message: format!("Mirror tool delete failed: {}", e),
            },
        }
    }

    /// One page of entries; merged with the mirror when `public`
    pub async fn list_entries(&self, public: bool, page: usize, limit: usize) -> Listing<Sourced<MemoryEntry>> {
        let local = self.storage.entries().list();
        let local_count = local.len();

        let (remote, firebase_error) = match self.mirror.as_ref().filter(|_| public) {
            Some(mirror) => match mirror.list_entries().await {
                Ok(remote) => (remote, None),
                Err(e) => {
                    tracing::warn!("Mirror entry listing failed: {}", e);
                    (Vec::new(), Some(e.to_string()))
                }
            },
            None => (Vec::new(), None),
        };
        let remote_count = remote.len();

        let merged = merge_entries(local, remote);
        let combined = merged.len();
        let (items, pagination) = paginate(merged, page, limit);

        Listing {
            items,
            pagination,
            sources: SourceCounts {
                local: local_count,
                firebase: remote_count,
                combined,
            },
            kind: "entries",
            firebase_error,
        }
    }

    /// One page of tools; merged with the mirror when `public`
    pub async fn list_tools(&self, public: bool, page: usize, limit: usize) -> Listing<Sourced<ToolDefinition>> {
        let local = self.storage.tools().list();
        let local_count = local.len();

        let (remote, firebase_error) = match self.mirror.as_ref().filter(|_| public) {
            Some(mirror) => match mirror.list_tools().await {
                Ok(remote) => (remote, None),
                Err(e) => {
                    tracing::warn!("Mirror tool listing failed: {}", e);
                    (Vec::new(), Some(e.to_string()))
                }
            },
            None => (Vec::new(), None),
        };
        let remote_count = remote.len();

        let merged = merge_tools(local, remote);
        let combined = merged.len();
        let (items, pagination) = paginate(merged, page, limit);

        Listing {
            items,
            pagination,
            sources: SourceCounts {
                local: local_count,
                firebase: remote_count,
                combined,
            },
            kind: "tools",
            firebase_error,
        }
    }

    /// Fetch a tool definition from the mirror by id, then by name.
    /// Fetched tools are granted network access.
    pub async fn fetch_tool(&self, mirror: &MirrorClient, identifier: &str) -> Result<ToolDefinition> {
        let tool = match mirror.get_tool(identifier).await? {
            Some(tool) => tool,
            None => mirror
                .list_tools()
                .await?
                .into_iter()
                .find(|t| t.name == identifier)
                .ok_or_else(|| {
                    MemvaultError::NotFound(format!("Tool '{}' not found on mirror", identifier))
                })?,
        };
        Ok(tool.with_network_access())
    }

    /// Delete every mirror entry one at a time
    pub async fn clear_remote_entries(&self, mirror: &MirrorClient) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        match mirror.list_entries().await {
            Ok(entries) => {
                for entry in entries {
                    let result = mirror.delete_entry(&entry.id).await.map(|_| ());
                    outcome.record(&entry.key, result);
                }
            }
            Err(e) => outcome.record("list", Err(e)),
        }
        outcome
    }

    /// Delete every mirror tool one at a time
    pub async fn clear_remote_tools(&self, mirror: &MirrorClient) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        match mirror.list_tools().await {
            Ok(tools) => {
                for tool in tools {
                    let result = mirror.delete_tool(&tool.id).await.map(|_| ());
                    outcome.record(&tool.name, result);
                }
            }
            Err(e) => outcome.record("list", Err(e)),
        }
        outcome
    }

    /// Push every local entry and tool. Existing mirror records (matched by
    /// key or name) are updated in place.
    pub async fn sync_all(&self) -> Result<SyncAllReport> {
        let mirror = self.require_mirror()?;
        let mut report = SyncAllReport::default();

        let remote_entries: HashMap<String, String> = mirror
            .list_entries()
            .await?
            .into_iter()
            .map(|e| (e.key, e.id))
            .collect();
        for entry in self.storage.entries().list() {
            let result = match remote_entries.get(&entry.key) {
                Some(remote_id) => mirror.update_entry(remote_id, &entry).await.map(|_| ()),
                None => mirror.create_entry(&entry).await.map(|_| ()),
            };
            report.entries.record(&entry.key, result);
        }

        let remote_tools: HashMap<String, String> = mirror
            .list_tools()
            .await?
            .into_iter()
            .map(|t| (t.name, t.id))
            .collect();
        for tool in self.storage.tools().list() {
            let result = match remote_tools.get(&tool.name) {
                Some(remote_id) => mirror.update_tool(remote_id, &tool).await.map(|_| ()),
                None => mirror.create_tool(&tool).await.map(|_| ()),
            };
            report.tools.record(&tool.name, result);
        }

        tracing::info!(
            "Mirror sync: {} entries, {} tools pushed; {} failures",
            report.entries.success,
            report.tools.success,
            report.entries.failed + report.tools.failed
        );
        Ok(report)
    }
}
