//! Serving the router with a bounded graceful shutdown.

use anyhow::Result;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// How the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished within the grace period
    Drained,
    /// The grace period elapsed and remaining connections were dropped
    Forced,
}

/// Serve `app` until `shutdown` resolves, then stop accepting connections and
/// give in-flight requests up to `grace` to finish.
pub async fn serve_with_grace<F>(
    listener: TcpListener,
    app: Router,
    shutdown: F,
    grace: Duration,
) -> Result<ShutdownOutcome>
where
    F: Future<Output = ()> + Send + 'static,
{
    let (drain_tx, mut drain_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = drain_rx.changed().await;
    });
    let mut server_task = tokio::spawn(async move { server.await });

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(ShutdownOutcome::Drained);
        }
        _ = shutdown => {}
    }

    tracing::info!("Shutting down API Gateway...");
    let _ = drain_tx.send(true);

    match tokio::time::timeout(grace, &mut server_task).await {
        Ok(result) => {
            result??;
            Ok(ShutdownOutcome::Drained)
        }
        Err(_) => {
            tracing::warn!(
                grace_ms = grace.as_millis() as u64,
                "Grace period elapsed, forcing shutdown"
            );
            server_task.abort();
            Ok(ShutdownOutcome::Forced)
        }
    }
}
