//! Tether server - broker tunnels between clients and workspace agents
//!
//! Serves the resource API plus the dial/listen WebSocket endpoints,
//! backed by a SQL store and an in-process signaling bus.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tether_api::rbac::AllowAll;
use tether_api::{ApiServer, ApiServerConfig};
use tether_broker::ConnectionGroup;
use tether_bus::MemoryBus;
use tether_db::Store;

/// Tether - broker tunnels to agents inside provisioned workspaces
#[derive(Parser, Debug)]
#[command(name = "tether-server")]
#[command(about = "Tether - broker tunnels to agents inside provisioned workspaces")]
#[command(version)]
struct Cli {
    /// Address to bind the API server
    #[arg(long, env = "TETHER_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Database connection URL
    #[arg(long, env = "TETHER_DATABASE_URL", default_value = "sqlite::memory:")]
    database_url: String,

    /// Disable CORS
    #[arg(long, env = "TETHER_NO_CORS")]
    no_cors: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let log_level = if verbose { "debug" } else { "info" };

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let db = tether_db::connect(&cli.database_url)
        .await
        .context("Failed to connect to database")?;
    tether_db::migrate(&db)
        .await
        .context("Failed to run migrations")?;
    info!("Database ready at {}", cli.database_url);

    let store = Store::new(db);
    let bus = Arc::new(MemoryBus::new());
    let group = ConnectionGroup::new();

    let server = ApiServer::new(
        ApiServerConfig {
            bind_addr: cli.bind,
            enable_cors: !cli.no_cors,
            ..ApiServerConfig::default()
        },
        store,
        bus,
        Arc::new(AllowAll),
        group.clone(),
    );

    tokio::select! {
        result = server.start() => {
            result.context("API server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down, draining {} open tunnels", group.active());
            tokio::select! {
                _ = group.wait_idle() => info!("All tunnels drained"),
                _ = tokio::signal::ctrl_c() => warn!("Second interrupt, exiting with open tunnels"),
            }
        }
    }

    Ok(())
}
