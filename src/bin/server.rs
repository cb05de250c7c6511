//! Memvault MCP Server
//!
//! Run with: memvault-server

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use memvault::dispatch::Dispatcher;
use memvault::error::{MemvaultError, Result};
use memvault::mcp::{McpServer, VaultHandler};
use memvault::types::{MirrorConfig, SandboxLimits, VaultConfig, DEFAULT_TIMEOUT_MS};

#[derive(Parser, Debug)]
#[command(name = "memvault-server")]
#[command(about = "Memvault MCP server: persistent memory and script tools")]
struct Args {
    /// Directory holding entries.json and tools.json
    #[arg(long, env = "MEMVAULT_DATA_DIR", default_value = "~/.local/share/memvault")]
    data_dir: String,

    /// Base URL of the remote mirror (public records only)
    #[arg(long, env = "MEMVAULT_MIRROR_URL")]
    mirror_url: Option<String>,

    /// Mirror request timeout in ms
    #[arg(long, env = "MEMVAULT_MIRROR_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    mirror_timeout_ms: u64,

    /// Operation budget for each script run
    #[arg(long, env = "MEMVAULT_MAX_OPERATIONS")]
    max_operations: Option<u64>,
}

impl Args {
    fn vault_config(&self) -> VaultConfig {
        let data_dir = shellexpand::tilde(&self.data_dir).to_string();
        let mut config = VaultConfig::new(data_dir);

        if let Some(url) = &self.mirror_url {
            config = config.with_mirror(MirrorConfig::new(url).with_timeout_ms(self.mirror_timeout_ms));
        }
        if let Some(max_operations) = self.max_operations {
            config.sandbox = SandboxLimits {
                max_operations,
                ..config.sandbox
            };
        }
        config
    }
}

fn main() -> Result<()> {
    // Initialize logging to stderr (stdout is for MCP protocol)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = args.vault_config();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| MemvaultError::Internal(format!("Failed to create tokio runtime: {}", e)))?;

    let dispatcher = Dispatcher::open(&config)?;
    let server = McpServer::new(VaultHandler::new(dispatcher, runtime.handle().clone()));

    tracing::info!(
        "Memvault MCP server starting (data dir {})...",
        config.data_dir.display()
    );
    server.run()?;

    Ok(())
}
