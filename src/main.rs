use std::sync::Arc;
use tracing::{error, info};

mod bus;
mod chat;
mod config;
mod entity;
mod error;
mod protocol;
mod server;
mod session;
mod store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("pairchat starting...");

    let config = config::Config::from_env()?;

    info!("Initializing store at {}", config.db_path.display());
    let store = store::Store::open(&config.db_path).await?;
    store.init().await?;

    let hub = Arc::new(bus::Hub::new());
    let coordinator = Arc::new(session::Coordinator::new(store, hub, config.paging));

    let app = server::ChatServer::new(coordinator).router();

    info!("Listening on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind).await?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        res = axum::serve(listener, app) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
    }

    Ok(())
}
