#![forbid(unsafe_code)]
//! eballscan explorer API server

use clap::Parser;
use eballscan::api::{run_api_server, Explorer};
use eballscan::config::{load_config_from, Overrides, DEFAULT_CONFIG_PATH};
use eballscan::persistence::open_store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "eballscan", version, about = "Blockchain explorer query and ingestion API")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite database file (overrides config and EBALLSCAN_DB)
    #[arg(long)]
    db: Option<String>,

    /// Keep all data in memory
    #[arg(long)]
    in_memory: bool,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            port: self.port,
            db: self.db.clone(),
            in_memory: self.in_memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config_from(&cli.config, &cli.overrides())?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        listen = %config.listen_address(),
        prefix = %config.server.route_prefix,
        "Starting eballscan"
    );

    let store = open_store(&config.database)?;
    let explorer = Arc::new(Explorer::new(store));

    run_api_server(explorer, &config.server).await
}
