//! Caixa server binary.
//!
//! ```text
//! ServerConfig::load ──► Database (migrations) ──► AppState ──► axum::serve
//!                                                                  │
//!                                            Ctrl+C / SIGTERM ─────┘ graceful shutdown
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use caixa_db::{Database, DbConfig};
use caixa_server::{router, AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("Starting Caixa server...");

    let config = ServerConfig::load().context("loading configuration")?;
    if config.uses_dev_secret() {
        warn!("Using the development JWT secret; set CAIXA__JWT_SECRET in production");
    }
    info!(
        bind = %config.bind_address,
        database = %config.database_path,
        "Configuration loaded"
    );

    let db_config =
        DbConfig::new(&config.database_path).max_connections(config.max_db_connections);
    let db = Database::new(db_config)
        .await
        .context("opening database")?;
    info!("Database ready");

    let bind_address = config.bind_address.clone();
    let state = AppState::new(db.clone(), config);
    let app = router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    info!(addr = %bind_address, "Listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving HTTP")?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Log filter from `RUST_LOG`, defaulting to info with debug for our crates.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,caixa_server=debug,caixa_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
