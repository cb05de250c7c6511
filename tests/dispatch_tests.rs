//! End-to-end tests through the action dispatcher
//!
//! Run with: cargo test --test dispatch_tests

use memvault::dispatch::Dispatcher;
use memvault::types::{MemoryEntry, VaultConfig};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tempfile::TempDir;

fn vault() -> (TempDir, VaultConfig, Dispatcher) {
    let dir = tempfile::tempdir().unwrap();
    let config = VaultConfig::new(dir.path());
    let dispatcher = Dispatcher::open(&config).unwrap();
    (dir, config, dispatcher)
}

async fn ok(vault: &Dispatcher, request: Value) -> Value {
    let response = vault.dispatch_value(request.clone()).await;
    assert!(response.success, "{} -> {}", request, response.message);
    response.data.unwrap_or(Value::Null)
}

async fn error_code(vault: &Dispatcher, request: Value) -> i64 {
    let response = vault.dispatch_value(request).await;
    assert!(!response.success);
    assert!(response.data.is_none());
    response.metadata.error_code.unwrap()
}

// ============================================================================
// ENTRIES
// ============================================================================

#[tokio::test]
async fn test_entry_lifecycle() {
    let (_dir, _config, vault) = vault();

    let stored = ok(
        &vault,
        json!({
            "action": "store",
            "key": "project.deadline",
            "value": {"date": "2025-03-01"},
            "type": "json",
            "description": "Launch date",
            "tags": ["work", "dates"]
        }),
    )
    .await;
    assert_eq!(stored["type"], json!("json"));
    assert_eq!(stored["tags"], json!(["work", "dates"]));

    let retrieved = ok(&vault, json!({"action": "retrieve", "key": "project.deadline"})).await;
    assert_eq!(retrieved["value"], json!({"date": "2025-03-01"}));
    assert_eq!(retrieved["accessCount"], json!(1));
    assert_eq!(retrieved["source"], json!("local"));

    let updated = ok(
        &vault,
        json!({"action": "update", "key": "project.deadline", "value": {"date": "2025-04-01"}}),
    )
    .await;
    assert_eq!(updated["id"], stored["id"]);
    assert_eq!(updated["description"], json!("Launch date"));
    assert_eq!(updated["accessCount"], json!(1));

    let deleted = ok(&vault, json!({"action": "delete", "key": "project.deadline"})).await;
    assert_eq!(deleted["deleted"], json!(true));

    let again = ok(&vault, json!({"action": "delete", "key": "project.deadline"})).await;
    assert_eq!(again["deleted"], json!(false));
}

#[tokio::test]
async fn test_store_overwrite_resets_stats() {
    let (_dir, _config, vault) = vault();

    let first = ok(&vault, json!({"action": "store", "key": "k", "value": 1})).await;
    ok(&vault, json!({"action": "retrieve", "key": "k"})).await;
    let second = ok(&vault, json!({"action": "store", "key": "k", "value": 2})).await;

    assert_ne!(first["id"], second["id"]);
    assert_eq!(second["accessCount"], json!(0));
    assert_eq!(vault.storage().entries().len(), 1);
}

#[tokio::test]
async fn test_validation_errors_are_codes_not_panics() {
    let (_dir, _config, vault) = vault();

    assert_eq!(error_code(&vault, json!({"action": "store", "value": 1})).await, -32602);
    assert_eq!(
        error_code(&vault, json!({"action": "store", "key": "bad key!", "value": 1})).await,
        -32602
    );
    assert_eq!(
        error_code(&vault, json!({"action": "store", "key": "k", "value": ""})).await,
        -32602
    );
    assert_eq!(
        error_code(&vault, json!({"action": "store", "key": "k".repeat(101), "value": 1})).await,
        -32602
    );
    assert_eq!(error_code(&vault, json!({"action": "no_such_action"})).await, -32602);
    assert_eq!(
        error_code(&vault, json!({"action": "update", "key": "absent", "value": 1})).await,
        -32001
    );
    assert!(vault.storage().entries().is_empty());
}

#[tokio::test]
async fn test_listing_is_newest_first_and_paginated() {
    let (_dir, _config, vault) = vault();

    for i in 0..5 {
        ok(&vault, json!({"action": "store", "key": format!("note{}", i), "value": i})).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let page = ok(&vault, json!({"action": "list", "page": 1, "limit": 2})).await;
    let keys: Vec<&str> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["key"].as_str().unwrap())
        .collect();
    assert_eq!(keys, vec!["note4", "note3"]);
    assert_eq!(page["pagination"]["total"], json!(5));
    assert_eq!(page["pagination"]["totalPages"], json!(3));
    assert_eq!(page["pagination"]["hasNext"], json!(true));
    assert_eq!(page["pagination"]["hasPrev"], json!(false));
    assert_eq!(page["type"], json!("entries"));

    let last = ok(&vault, json!({"action": "list", "page": 3, "limit": 2})).await;
    assert_eq!(last["items"].as_array().unwrap().len(), 1);
    assert_eq!(last["pagination"]["hasNext"], json!(false));
}

#[tokio::test]
async fn test_search_covers_entries_and_tools() {
    let (_dir, _config, vault) = vault();

    ok(&vault, json!({"action": "store", "key": "weather.today", "value": "sunny"})).await;
    ok(&vault, json!({"action": "store", "key": "groceries", "value": "milk"})).await;
    ok(
        &vault,
        json!({
            "action": "create_tool", "toolName": "weather_report",
            "toolDescription": "Summarize weather", "handlerCode": "\"fine\""
        }),
    )
    .await;

    let results = ok(&vault, json!({"action": "search", "query": "  WEATHER "})).await;
    assert_eq!(results["entries"][0]["key"], json!("weather.today"));
    assert_eq!(results["tools"][0]["name"], json!("weather_report"));
    assert_eq!(results["totalFound"], json!(2));

    let none = ok(&vault, json!({"action": "search", "query": "xylophone"})).await;
    assert_eq!(none["totalFound"], json!(0));
    assert!(none["suggestions"].is_array());
}

// ============================================================================
// TOOLS
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_tool_scripts_share_the_entry_store() {
    let (_dir, _config, vault) = vault();

    ok(
        &vault,
        json!({
            "action": "create_tool",
            "toolName": "remember",
            "toolDescription": "Store a note",
            "handlerCode": "storage.store(args.key, args.text); #{ saved: args.key }"
        }),
    )
    .await;

    let executed = ok(
        &vault,
        json!({
            "action": "execute_tool", "toolName": "remember",
            "args": {"key": "from.script", "text": "hello"}
        }),
    )
    .await;
    assert_eq!(executed["result"], json!({"saved": "from.script"}));
    assert_eq!(executed["usageCount"], json!(1));

    let entry = ok(&vault, json!({"action": "retrieve", "key": "from.script"})).await;
    assert_eq!(entry["value"], json!("hello"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tool_errors_map_to_codes() {
    let (_dir, _config, vault) = vault();
    let create = json!({
        "action": "create_tool", "toolName": "boom",
        "toolDescription": "Always fails", "handlerCode": "throw \"kaboom\";"
    });

    ok(&vault, create.clone()).await;
    assert_eq!(error_code(&vault, create).await, -32006);

    let response = vault
        .dispatch_value(json!({"action": "execute_tool", "toolName": "boom"}))
        .await;
    assert!(!response.success);
    assert_eq!(response.metadata.error_code, Some(-32010));
    assert!(response.message.contains("boom"));
    assert!(response.message.contains("kaboom"));

    assert_eq!(
        error_code(&vault, json!({"action": "execute_tool", "toolName": "ghost"})).await,
        -32001
    );
    assert_eq!(
        error_code(
            &vault,
            json!({
                "action": "create_tool", "toolName": "bad.name",
                "toolDescription": "x", "handlerCode": "1"
            })
        )
        .await,
        -32602
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_runaway_script_is_stopped() {
    let (_dir, _config, vault) = vault();
    ok(
        &vault,
        json!({
            "action": "create_tool", "toolName": "spin",
            "toolDescription": "Never ends", "handlerCode": "loop { }"
        }),
    )
    .await;

    let code = error_code(&vault, json!({"action": "execute_tool", "toolName": "spin"})).await;
    assert_eq!(code, -32010);
}

// ============================================================================
// CONCURRENCY AND DURABILITY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_stores_all_land_in_snapshot() {
    let (_dir, config, vault) = vault();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let vault = vault.clone();
            tokio::spawn(async move {
                vault
                    .dispatch_value(json!({"action": "store", "key": format!("k{}", i), "value": i}))
                    .await
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.unwrap().success);
    }

    let content = std::fs::read_to_string(config.entries_path()).unwrap();
    let snapshot: Vec<MemoryEntry> = serde_json::from_str(&content).unwrap();
    assert_eq!(snapshot.len(), 16);
    for i in 0..16 {
        let key = format!("k{}", i);
        let entry = snapshot.iter().find(|e| e.key == key).unwrap();
        assert_eq!(entry.value, json!(i));
    }
}

#[tokio::test]
async fn test_state_survives_reopen() {
    let (_dir, config, vault) = vault();
    ok(&vault, json!({"action": "store", "key": "durable", "value": [1, 2, 3]})).await;
    ok(
        &vault,
        json!({
            "action": "create_tool", "toolName": "echo",
            "toolDescription": "Echo args", "handlerCode": "args"
        }),
    )
    .await;
    drop(vault);

    let reopened = Dispatcher::open(&config).unwrap();
    let entry = ok(&reopened, json!({"action": "retrieve", "key": "durable"})).await;
    assert_eq!(entry["value"], json!([1, 2, 3]));
    assert!(reopened.storage().tools().get("echo").is_some());
}

// ============================================================================
// MAINTENANCE
// ============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn test_stats_reflect_usage() {
    let (_dir, _config, vault) = vault();

    ok(&vault, json!({"action": "store", "key": "user.name", "value": "ada", "tags": ["profile"]})).await;
    ok(&vault, json!({"action": "store", "key": "user.email", "value": "a@x", "tags": ["profile"]})).await;
    ok(&vault, json!({"action": "retrieve", "key": "user.name"})).await;
    ok(
        &vault,
        json!({
            "action": "create_tool", "toolName": "noop",
            "toolDescription": "Does nothing", "handlerCode": "()", "toolType": "analyzer"
        }),
    )
    .await;
    ok(&vault, json!({"action": "execute_tool", "toolName": "noop"})).await;

    let stats = ok(&vault, json!({"action": "stats"})).await;
    assert_eq!(stats["entries"]["totalEntries"], json!(2));
    assert_eq!(stats["entries"]["byType"]["text"], json!(2));
    assert_eq!(stats["entries"]["tagCounts"]["profile"], json!(2));
    assert_eq!(stats["entries"]["keyPatterns"][0], json!({"prefix": "user", "count": 2}));
    assert_eq!(stats["entries"]["mostAccessedEntry"]["key"], json!("user.name"));
    assert_eq!(stats["tools"]["totalTools"], json!(1));
    assert_eq!(stats["tools"]["totalUsage"], json!(1));
    assert_eq!(stats["tools"]["byType"]["analyzer"], json!(1));
    assert_eq!(stats["tools"]["mostUsedTool"]["name"], json!("noop"));
}

#[tokio::test]
async fn test_export_then_import_into_fresh_vault() {
    let (_dir, _config, source) = vault();
    ok(&source, json!({"action": "store", "key": "a", "value": 1, "tags": ["x"]})).await;
    ok(&source, json!({"action": "store", "key": "b", "value": {"nested": true}})).await;
    ok(
        &source,
        json!({
            "action": "create_tool", "toolName": "echo",
            "toolDescription": "Echo args", "handlerCode": "args"
        }),
    )
    .await;

    let backup = ok(&source, json!({"action": "export"})).await;
    assert_eq!(backup["entries"].as_array().unwrap().len(), 2);
    assert_eq!(backup["tools"].as_array().unwrap().len(), 1);

    let (_dir2, _config2, target) = vault();
    let report = ok(&target, json!({"action": "import", "data": backup})).await;
    assert_eq!(report["restored"], json!(3));
    assert_eq!(report["skipped"], json!(0));

    let entry = ok(&target, json!({"action": "retrieve", "key": "b"})).await;
    assert_eq!(entry["value"], json!({"nested": true}));
    assert!(target.storage().tools().get("echo").is_some());

    // A second import skips the existing tool and refreshes entries
    let again = ok(&target, json!({"action": "import", "data": backup.to_string()})).await;
    assert_eq!(again["restored"], json!(2));
    assert_eq!(again["skipped"], json!(1));
}

#[tokio::test]
async fn test_import_rejects_garbage() {
    let (_dir, _config, vault) = vault();
    assert_eq!(error_code(&vault, json!({"action": "import"})).await, -32602);
    assert_eq!(
        error_code(&vault, json!({"action": "import", "data": "{not json"})).await,
        -32602
    );

    let report = ok(
        &vault,
        json!({"action": "import", "data": {"entries": [{"key": "bad key", "value": 1}]}}),
    )
    .await;
    assert_eq!(report["restored"], json!(0));
    assert!(report["errors"][0].as_str().unwrap().starts_with("bad key"));
}

#[tokio::test]
async fn test_clear_and_reset() {
    let (_dir, _config, vault) = vault();
    ok(&vault, json!({"action": "store", "key": "a", "value": 1})).await;
    ok(&vault, json!({"action": "store", "key": "b", "value": 2})).await;
    ok(
        &vault,
        json!({
            "action": "create_tool", "toolName": "t",
            "toolDescription": "t", "handlerCode": "1"
        }),
    )
    .await;

    let cleared = ok(&vault, json!({"action": "clear_all"})).await;
    assert_eq!(cleared["cleared"], json!(2));
    assert!(cleared.get("firebase").is_none());
    assert_eq!(vault.storage().tools().len(), 1);

    let reset = ok(&vault, json!({"action": "reset"})).await;
    assert_eq!(reset["entriesCleared"], json!(0));
    assert_eq!(reset["toolsCleared"], json!(1));
}
