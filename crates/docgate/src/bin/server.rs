//! docgate server binary
//!
//! Run with: cargo run -p docgate --bin docgate-server [config.toml]

use docgate::{config::GateConfig, server::GateServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docgate=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // First CLI argument may name a config file; defaults otherwise.
    let config = match std::env::args().nth(1) {
        Some(path) => GateConfig::load(&path)?,
        None => GateConfig::default(),
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - scripts dir: {}", config.scripts.dir.display());
    tracing::info!("  - base dir: {}", config.storage.base_dir.display());
    tracing::info!(
        "  - queue: {} concurrent, {} pending max",
        config.queue.max_concurrent,
        config.queue.max_queue_size
    );
    tracing::info!(
        "  - history: {} ({} day retention)",
        config.history.path.display(),
        config.history.retention_days
    );
    if config.server.api_key.is_none() {
        tracing::warn!("no API key configured; the /api surface is open");
    }

    let server = GateServer::new(config)?;

    println!("docgate listening on http://{}", server.address());
    println!("  POST /api/upload           - upload documents");
    println!("  POST /api/process/:client  - process a client inbox");
    println!("  POST /api/automation       - automation entry point");
    println!("  GET  /api/history          - processing history");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
