//! Script sandbox
//!
//! A fresh Rhai engine is built for every execution. It starts from the
//! standard packages, loses `eval` and module imports, and gains exactly the
//! capabilities granted to the tool:
//!
//! - `args`: the caller's argument map
//! - `storage`: a handle with `store`, `retrieve`, `search`, `delete`, `update`
//! - `generate_id()`
//! - `fetch(url, options)` and `base64_encode(text)` for network-capable tools

use base64::Engine as _;
use rhai::module_resolvers::DummyModuleResolver;
use rhai::serde::{from_dynamic, to_dynamic};
use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::str::FromStr;

use super::fetch::FetchRequest;
use crate::error::{MemvaultError, Result};
use crate::search::search_entries;
use crate::storage::Storage;
use crate::types::{generate_id, EntryType, SandboxLimits};

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

fn runtime_error(message: impl Display) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(Dynamic::from(message.to_string()), Position::NONE).into()
}

fn execution_error(tool: &str, message: impl Display) -> MemvaultError {
    MemvaultError::Execution {
        tool: tool.to_string(),
        message: message.to_string(),
    }
}

/// The `storage` object visible to scripts
#[derive(Clone)]
pub struct ScriptStorage {
    storage: Storage,
}

impl ScriptStorage {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn store(&mut self, key: &str, value: Dynamic, kind: Option<&str>) -> ScriptResult<Dynamic> {
        let value: Value = from_dynamic(&value)?;
        let entry_type = match kind {
            Some(kind) => EntryType::from_str(kind).map_err(runtime_error)?,
            None => EntryType::default(),
        };
        let entry = self
            .storage
            .entries()
            .store(key, value, entry_type, None, Vec::new())
            .map_err(runtime_error)?;
        to_dynamic(&entry)
    }

    fn retrieve(&mut self, key: &str) -> ScriptResult<Dynamic> {
        match self.storage.entries().retrieve(key).map_err(runtime_error)? {
            Some(entry) => to_dynamic(&entry),
            None => Ok(Dynamic::UNIT),
        }
    }

    fn update(&mut self, key: &str, value: Dynamic) -> ScriptResult<Dynamic> {
        let value: Value = from_dynamic(&value)?;
        match self
            .storage
            .entries()
            .update(key, value, None, None)
            .map_err(runtime_error)?
        {
            Some(entry) => to_dynamic(&entry),
            None => Ok(Dynamic::UNIT),
        }
    }

    fn delete(&mut self, key: &str) -> ScriptResult<bool> {
        self.storage.entries().delete(key).map_err(runtime_error)
    }

    fn search(&mut self, query: &str, limit: Option<i64>) -> ScriptResult<Dynamic> {
        let limit = limit.map(|l| l.max(0) as usize);
        let entries = search_entries(&self.storage, query, limit).map_err(runtime_error)?;
        to_dynamic(&entries)
    }

    fn register(engine: &mut Engine) {
        engine
            .register_type_with_name::<ScriptStorage>("Storage")
            .register_fn("store", |s: &mut ScriptStorage, key: &str, value: Dynamic| {
                s.store(key, value, None)
            })
            .register_fn(
                "store",
                |s: &mut ScriptStorage, key: &str, value: Dynamic, kind: &str| {
                    s.store(key, value, Some(kind))
                },
            )
            .register_fn("retrieve", |s: &mut ScriptStorage, key: &str| s.retrieve(key))
            .register_fn("update", |s: &mut ScriptStorage, key: &str, value: Dynamic| {
                s.update(key, value)
            })
            .register_fn("delete", |s: &mut ScriptStorage, key: &str| s.delete(key))
            .register_fn("search", |s: &mut ScriptStorage, query: &str| s.search(query, None))
            .register_fn("search", |s: &mut ScriptStorage, query: &str, limit: i64| {
                s.search(query, Some(limit))
            });
    }
}

/// Network access for scripts, driven on the caller's tokio runtime
#[derive(Clone)]
pub struct FetchCapability {
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
}

impl FetchCapability {
    pub fn new(client: reqwest::Client, runtime: tokio::runtime::Handle) -> Self {
        Self { client, runtime }
    }

    /// Must be called off the async executor threads
    fn fetch(&self, url: &str, options: Value) -> ScriptResult<Dynamic> {
        let request = FetchRequest::from_options(url, &options).map_err(runtime_error)?;
        let response = self
            .runtime
            .block_on(request.send(&self.client))
            .map_err(runtime_error)?;
        to_dynamic(&response)
    }

    fn register(&self, engine: &mut Engine) {
        let with_options = self.clone();
        let bare = self.clone();

        engine
            .register_fn("fetch", move |url: &str, options: rhai::Map| {
                let options: Value = from_dynamic(&Dynamic::from_map(options))?;
                with_options.fetch(url, options)
            })
            .register_fn("fetch", move |url: &str| {
                bare.fetch(url, Value::Object(Map::new()))
            })
            .register_fn("base64_encode", |text: &str| {
                base64::engine::general_purpose::STANDARD.encode(text)
            });
    }
}

/// One execution context
pub struct Sandbox {
    storage: Storage,
    limits: SandboxLimits,
    fetch: Option<FetchCapability>,
}

impl Sandbox {
    pub fn new(storage: Storage, limits: SandboxLimits) -> Self {
        Self {
            storage,
            limits,
            fetch: None,
        }
    }

    pub fn with_fetch(mut self, fetch: FetchCapability) -> Self {
        self.fetch = Some(fetch);
        self
    }

    fn engine(&self) -> Engine {
        let mut engine = Engine::new();

        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");

        engine.set_max_operations(self.limits.max_operations);
        engine.set_max_call_levels(self.limits.max_call_levels);
        engine.set_max_expr_depths(self.limits.max_expr_depth, self.limits.max_expr_depth);
        engine.set_max_string_size(self.limits.max_string_size);
        engine.set_max_array_size(self.limits.max_array_size);
        engine.set_max_map_size(self.limits.max_map_size);

        // stdout carries protocol traffic
        engine.on_print(|text| tracing::debug!(target: "memvault::script", "{}", text));
        engine.on_debug(|text, _source, pos| {
            tracing::debug!(target: "memvault::script", "{} @ {}", text, pos)
        });

        engine.register_fn("generate_id", generate_id);
        ScriptStorage::register(&mut engine);
        if let Some(fetch) = &self.fetch {
            fetch.register(&mut engine);
        }

        engine
    }

    /// Run `script` for the tool named `tool_name`. Blocking; may perform
    /// nested store operations and, with fetch granted, network calls.
    pub fn run(&self, tool_name: &str, script: &str, args: Value) -> Result<Value> {
        let engine = self.engine();

        let args = match args {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        let args = to_dynamic(&args).map_err(|e| execution_error(tool_name, e))?;

        let mut scope = Scope::new();
        scope.push("args", args);
        scope.push("storage", ScriptStorage::new(self.storage.clone()));

        let output = engine
            .eval_with_scope::<Dynamic>(&mut scope, script)
            .map_err(|e| execution_error(tool_name, e))?;

        from_dynamic::<Value>(&output).map_err(|e| {
            execution_error(tool_name, format!("result is not representable as JSON: {}", e))
        })
    }
}
