use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use lobby_lib::store::{EntityStore, MemoryStore, SqliteStore};
use lobby_lib::{web_server, LobbyConfig, SessionCoordinator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Sqlite,
}

/// Game session coordinator server
#[derive(Debug, Parser)]
#[command(name = "lobby-server", version, about)]
struct Cli {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Entity store engine
    #[arg(long, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    /// Database file for the sqlite store
    #[arg(long, default_value = "lobby.db")]
    database: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    // Collection names are required; without them there is nothing to serve
    let config = LobbyConfig::from_env().context("loading configuration")?;

    let store: Arc<dyn EntityStore> = match cli.store {
        StoreKind::Memory => Arc::new(MemoryStore::new()),
        StoreKind::Sqlite => Arc::new(
            SqliteStore::open(&cli.database)
                .with_context(|| format!("opening sqlite store at {}", cli.database.display()))?,
        ),
    };

    let coordinator = Arc::new(SessionCoordinator::new(store, config));
    let app = web_server::router(coordinator);

    let listener = tokio::net::TcpListener::bind(cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!("Lobby server listening on {}", cli.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving requests")?;

    info!("Lobby server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
