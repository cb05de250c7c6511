//! Memvault - persistent memory for AI agents
//!
//! A key/value entry store and a store of user-authored script tools, both
//! snapshotted to local JSON files, with relevance search, sandboxed tool
//! execution and an optional remote mirror for records tagged `public`.
//! Everything is reachable through one [`dispatch::Dispatcher`].

pub mod dispatch;
pub mod error;
pub mod exec;
pub mod mcp;
pub mod remote;
pub mod search;
pub mod storage;
pub mod types;
pub mod validation;

pub use dispatch::{Action, ActionResponse, Dispatcher};
pub use error::{MemvaultError, Result};
pub use storage::Storage;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
