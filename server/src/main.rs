use std::net::SocketAddr;

use anyhow::Result;
use folio_core::{AppState, Config};
use tracing::info;

mod error;
mod routes;
mod server;

/// Build the tracing filter from `RUST_LOG`, falling back to `LOG_LEVEL`.
fn log_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::EnvFilter::new(level.to_lowercase())
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()).init();

    let config = Config::from_env();
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir.display(),
        db_path = %config.db_path.display(),
        vector_backend = %config.vector_store_backend,
        "Folio server starting"
    );

    let state = AppState::new(config)?;
    let app = server::create_app(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Folio server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Persist the vector index before exit; a no-op for the memory backend.
    if let Err(e) = state.vectors.flush() {
        tracing::error!(error = %e, "Failed to flush vector store on shutdown");
    }
    info!("Folio server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("Received Ctrl+C, initiating shutdown"); },
        _ = terminate => { info!("Received terminate signal, initiating shutdown"); },
    }
}
