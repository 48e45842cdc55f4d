//! Mock Studio - CLI Entry Point

use anyhow::Result;
use clap::Parser;
use mock_studio::config::ServerConfig;
use mock_studio::server::{router, AppState};
use mock_studio::store::{DbState, Store};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "mock-studio",
    about = "Mock banking API with a dynamic, rule-driven stub engine",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mock-studio.yaml")]
    config: PathBuf,

    /// Listen address, overrides the configuration file
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let mut config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        ServerConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!("Configuration is valid");
        return Ok(());
    }
    config.validate()?;

    // Open the persistent store (or an in-memory one when snapshots
    // are disabled) seeded with the bootstrap admin and banking data.
    let seeds = DbState::seeded(config.admin.seed_admin());
    let store = if config.snapshot.enabled {
        let store = Arc::new(Store::open(Some(config.snapshot.path.clone()), seeds));
        tokio::spawn(Arc::clone(&store).run_snapshot_loop(Duration::from_secs(
            config.snapshot.interval_secs,
        )));
        store
    } else {
        Arc::new(Store::in_memory(seeds))
    };

    let app = router(AppState::new(store));
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "Mock Studio listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
