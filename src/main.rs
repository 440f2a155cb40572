//! Chatline Server
//!
//! Run with: cargo run -- --config ./config.toml
//!
//! # Configuration
//!
//! Settings come from a TOML file (see `--print-config`) and are overridden by
//! environment variables:
//! - `CHATLINE_API_HOST`, `CHATLINE_API_PORT`: Bind address
//! - `CHATLINE_DATABASE_PATH`: SQLite database file
//! - `CHATLINE_JWT_SECRET` (or `JWT_SECRET`): Shared HS256 secret
//! - `CHATLINE_WS_QUEUE_CAPACITY`: Per-connection outbound queue size
//! - `CHATLINE_WS_IDLE_TIMEOUT_SECS`: Idle time before a keep-alive ping
//! - `CHATLINE_LOG_LEVEL`, `CHATLINE_LOG_FORMAT`: Logging (`RUST_LOG` wins when set)

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatline::api::{serve, AppState};
use chatline::config::{generate_default_config, Config, LoggingConfig};
use chatline::store::ChatStore;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Real-time chat backend with per-conversation WebSocket fan-out")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the bind port
    #[arg(short, long)]
    port: Option<u16>,

    /// Print a default config file and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", generate_default_config());
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_default(),
    };

    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.port {
        config.api.port = port;
    }

    init_tracing(&config.logging);

    tracing::info!("Starting Chatline server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Database: {:?}", config.store.database_path);

    if config.auth.uses_dev_secret() {
        tracing::warn!("Using the development JWT secret; set CHATLINE_JWT_SECRET in production");
    }

    let store = ChatStore::open(Path::new(&config.store.database_path))
        .with_context(|| format!("Failed to open database at {}", config.store.database_path))?;

    let state = AppState::new(Arc::new(store), config);
    serve(state).await?;

    tracing::info!("Chatline server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("chatline={},tower_http=debug", logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);

    if logging.is_json() {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
