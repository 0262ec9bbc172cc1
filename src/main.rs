use std::sync::Arc;

use sparrow_live::{
    SparrowError, SparrowResult,
    handlers::router,
    state::{AppConfig, AppState},
};
use tokio::{
    net::TcpListener,
    signal::{self, ctrl_c},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() -> SparrowResult<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env()?;
    let bind_addr = config.bind_addr;

    info!("Initializing state...");
    let state = Arc::new(AppState::new(config).await?);
    let app = router(state.clone());

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| SparrowError::internal_error(format!("failed to bind {bind_addr}: {e}")))?;
    info!("Server running on {bind_addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.shutdown();
    if let Err(e) = served {
        error!("Server error: {}", e);
        return Err(SparrowError::internal_error(e.to_string()));
    }

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}
