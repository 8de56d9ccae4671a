use crate::app::build_engine;
use crate::app::routes::{router, AppState};
use crate::config::AppConfig;
use crate::utils::error::{AppError, Result};
use std::future::Future;
use std::sync::Arc;

/// Serves the HTTP API until ctrl-c or SIGTERM, then closes the browser.
pub async fn run(config: AppConfig) -> Result<()> {
    let (engine, pool) = build_engine(&config)?;
    tracing::info!(
        "Transport: {}, request deadline: {:?}",
        engine.resolver().transport_name(),
        config.transport.request_deadline()
    );

    let app = router(AppState {
        engine: Arc::new(engine),
    });

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::ServerError {
            message: e.to_string(),
        });

    if let Some(pool) = pool {
        pool.shutdown().await;
    }
    tracing::info!("Server stopped");
    served
}

/// Drives `work` to completion unless `signal` fires first, in which case
/// `work` is dropped and `None` is returned.
pub async fn until_shutdown<F, S>(work: F, signal: S) -> Option<F::Output>
where
    F: Future,
    S: Future<Output = ()>,
{
    tokio::select! {
        output = work => Some(output),
        _ = signal => None,
    }
}

/// Resolves on ctrl-c or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
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
                tracing::error!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
