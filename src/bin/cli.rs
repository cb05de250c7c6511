//! Memvault CLI
//!
//! Command-line interface over the same dispatcher the MCP server uses.

use std::io::Read;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;

use memvault::dispatch::{
    Action, ActionResponse, Dispatcher, ImportRequest, KeyRequest, ListRequest, SearchRequest,
    StoreRequest, ToolRequest, UpdateRequest,
};
use memvault::types::{EntryType, MirrorConfig, VaultConfig, DEFAULT_TIMEOUT_MS, PUBLIC_TAG};

#[derive(Parser)]
#[command(name = "memvault")]
#[command(about = "Persistent memory and script tools")]
#[command(version)]
struct Cli {
    /// Directory holding entries.json and tools.json
    #[arg(long, env = "MEMVAULT_DATA_DIR", default_value = "~/.local/share/memvault")]
    data_dir: String,

    /// Base URL of the remote mirror (public records only)
    #[arg(long, env = "MEMVAULT_MIRROR_URL")]
    mirror_url: Option<String>,

    /// Mirror request timeout in ms
    #[arg(long, env = "MEMVAULT_MIRROR_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    mirror_timeout_ms: u64,

    /// Print the full response envelope instead of message and data
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a value under a key (overwrites)
    Store {
        key: String,
        /// JSON value; anything that does not parse is stored as a string
        value: String,
        /// Entry type
        #[arg(short, long, default_value = "text")]
        r#type: EntryType,
        #[arg(short, long)]
        description: Option<String>,
        /// Tags (comma-separated)
        #[arg(short = 'T', long)]
        tags: Option<String>,
        /// Also replicate to the mirror
        #[arg(long)]
        public: bool,
    },
    /// Retrieve an entry
    Get {
        key: String,
        /// Look on the mirror first
        #[arg(long)]
        public: bool,
    },
    /// Replace the value of an existing entry
    Update {
        key: String,
        value: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Tags (comma-separated); replaces existing tags
        #[arg(short = 'T', long)]
        tags: Option<String>,
    },
    /// Delete an entry
    Delete {
        key: String,
        #[arg(long)]
        public: bool,
    },
    /// List entries, newest first
    List {
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Merge in mirror entries
        #[arg(long)]
        public: bool,
    },
    /// Search entries and tools
    Search {
        query: String,
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// List tools
    Tools {
        #[arg(short, long, default_value = "1")]
        page: usize,
        #[arg(short, long, default_value = "20")]
        limit: usize,
        #[arg(long)]
        public: bool,
    },
    /// Execute a tool by id or name
    Run {
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long, default_value = "{}")]
        args: String,
        /// Fall back to the mirror when the tool is not local
        #[arg(long)]
        public: bool,
    },
    /// Show statistics
    Stats,
    /// Write a backup document
    Export {
        /// Output file (- for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// Restore a backup document
    Import {
        /// Input file (- for stdin)
        input: String,
    },
    /// Send a raw action envelope (JSON text, or - for stdin)
    Action { request: String },
}

fn split_tags(tags: Option<String>, public: bool) -> Option<Vec<String>> {
    let mut tags: Vec<String> = tags
        .map(|t| {
            t.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if public && !tags.iter().any(|t| t == PUBLIC_TAG) {
        tags.push(PUBLIC_TAG.to_string());
    }
    (!tags.is_empty()).then_some(tags)
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn read_input(source: &str) -> anyhow::Result<String> {
    if source == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading {}", source))
    }
}

fn into_action(command: Commands) -> anyhow::Result<Action> {
    let action = match command {
        Commands::Store {
            key,
            value,
            r#type,
            description,
            tags,
            public,
        } => Action::Store(StoreRequest {
            key: Some(key),
            value: Some(parse_value(&value)),
            entry_type: Some(r#type),
            description,
            tags: split_tags(tags, public),
        }),
        Commands::Get { key, public } => Action::Retrieve(KeyRequest {
            key: Some(key),
            tags: split_tags(None, public),
        }),
        Commands::Update {
            key,
            value,
            description,
            tags,
        } => Action::Update(UpdateRequest {
            key: Some(key),
            value: Some(parse_value(&value)),
            description,
            tags: split_tags(tags, false),
        }),
        Commands::Delete { key, public } => Action::Delete(KeyRequest {
            key: Some(key),
            tags: split_tags(None, public),
        }),
        Commands::List {
            page,
            limit,
            public,
        } => Action::List(ListRequest {
            tags: split_tags(None, public),
            page: Some(page),
            limit: Some(limit),
        }),
        Commands::Search { query, limit } => Action::Search(SearchRequest {
            query: Some(query),
            limit,
        }),
        Commands::Tools {
            page,
            limit,
            public,
        } => Action::ListTools(ListRequest {
            tags: split_tags(None, public),
            page: Some(page),
            limit: Some(limit),
        }),
        Commands::Run { tool, args, public } => {
            let args: Value = serde_json::from_str(&args).context("--args must be JSON")?;
            Action::ExecuteTool(ToolRequest {
                tool_name: Some(tool),
                args: Some(args),
                tags: split_tags(None, public),
                ..Default::default()
            })
        }
        Commands::Stats => Action::Stats,
        Commands::Export { .. } => Action::Export,
        Commands::Import { input } => Action::Import(ImportRequest {
            data: Some(Value::String(read_input(&input)?)),
        }),
        Commands::Action { request } => {
            let raw: Value = serde_json::from_str(&read_input_or_literal(&request)?)
                .context("request must be a JSON object")?;
            serde_json::from_value(raw).context("not a valid action")?
        }
    };
    Ok(action)
}

fn read_input_or_literal(request: &str) -> anyhow::Result<String> {
    if request == "-" {
        read_input(request)
    } else {
        Ok(request.to_string())
    }
}

fn print_response(response: &ActionResponse, full: bool) -> anyhow::Result<()> {
    if full {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("{}", response.message);
    if let Some(data) = &response.data {
        if !data.is_null() {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = shellexpand::tilde(&cli.data_dir).to_string();
    let mut config = VaultConfig::new(data_dir);
    if let Some(url) = &cli.mirror_url {
        config = config.with_mirror(MirrorConfig::new(url).with_timeout_ms(cli.mirror_timeout_ms));
    }

    let dispatcher = Dispatcher::open(&config)?;

    let export_target = match &cli.command {
        Commands::Export { output } if output != "-" => Some(output.clone()),
        _ => None,
    };

    let response = dispatcher.dispatch(into_action(cli.command)?).await;

    match (export_target, &response.data) {
        (Some(path), Some(data)) if response.success => {
            std::fs::write(&path, serde_json::to_string_pretty(data)?)?;
            println!("{} to {}", response.message, path);
        }
        _ => print_response(&response, cli.json)?,
    }

    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
