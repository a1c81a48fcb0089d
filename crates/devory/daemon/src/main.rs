//! Devory daemon - collaboration slot allocation service
//!
//! The daemon provides:
//! - REST API for collaboration posts and join requests
//! - In-memory or PostgreSQL storage
//! - Per-user notification feed for allocator decisions

use clap::Parser;
use devory_daemon::error::{DaemonError, DaemonResult};
use devory_daemon::{DaemonConfig, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Devory daemon CLI
#[derive(Parser)]
#[command(name = "devoryd")]
#[command(about = "Devory daemon - collaboration slot allocation service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "DEVORY_CONFIG")]
    config: Option<String>,

    /// Listen address
    #[arg(short, long, env = "DEVORY_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level
    #[arg(long, env = "DEVORY_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "DEVORY_LOG_JSON")]
    json: bool,

    /// PostgreSQL connection URL; selects PostgreSQL storage
    #[arg(long, env = "DEVORY_DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(url) = cli.database_url {
        config.use_postgres(url);
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        "Starting devoryd"
    );

    let server = Server::new(config).await?;
    server.run().await
}
