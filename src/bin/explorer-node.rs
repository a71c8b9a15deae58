#![forbid(unsafe_code)]
//! Explorer node: serves the explorer API or runs one-off window scans.

use clap::{Parser, Subcommand};
use shard_explorer::address::Bech32Codec;
use shard_explorer::api::{run_api_server, ApiState};
use shard_explorer::config::{load_config, Config, DEFAULT_CONFIG_PATH};
use shard_explorer::explorer::{check_window, Explorer};
use shard_explorer::persistence::{SqliteStore, Storage};
use shard_explorer::scanner::BlockWindowScanner;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serves the explorer HTTP API
    Serve {
        /// Port to listen on, overriding the configured one
        #[arg(long)]
        port: Option<u16>,
    },
    /// Scans a block window and prints it as JSON
    Scan {
        #[arg(long)]
        from: u64,
        #[arg(long)]
        to: u64,
    },
}

fn open_store(config: &Config) -> Result<Arc<dyn Storage>, Box<dyn std::error::Error>> {
    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store: Arc<dyn Storage> = Arc::new(SqliteStore::open(&config.database.path)?);
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let store = open_store(&config)?;

    match cli.command {
        Commands::Serve { port } => {
            let port = match port {
                Some(port) => port,
                None => config.network.explorer_port()?,
            };
            info!(
                shard_id = config.network.shard_id,
                database = %config.database.path,
                "starting explorer"
            );
            let explorer = Explorer::from_config(store, &config)?;
            let state = ApiState::new(explorer)
                .with_scan_timeout(Duration::from_secs(config.explorer.scan_timeout_secs));
            run_api_server(state, port).await?;
        }
        Commands::Scan { from, to } => {
            check_window(from, to, config.explorer.max_window)?;
            let codec = Bech32Codec::new(&config.network.address_hrp)?;
            let scanner = BlockWindowScanner::new(store.as_ref(), config.network.shard_id, &codec);
            let blocks = scanner.scan(from, to);
            println!("{}", serde_json::to_string_pretty(&blocks)?);
        }
    }

    Ok(())
}
