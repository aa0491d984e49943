//! Server shutdown with and without in-flight requests.

use axum::{extract::State, routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tenant_gateway::api::{serve_with_grace, ShutdownOutcome};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Notify};

async fn stuck_handler(State(entered): State<Arc<Notify>>) -> &'static str {
    entered.notify_one();
    tokio::time::sleep(Duration::from_secs(30)).await;
    "done"
}

fn app(entered: Arc<Notify>) -> Router {
    Router::new()
        .route("/ok", get(|| async { "ok" }))
        .route("/stuck", get(stuck_handler))
        .with_state(entered)
}

#[tokio::test]
async fn test_idle_server_drains_immediately() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(serve_with_grace(
        listener,
        app(Arc::new(Notify::new())),
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_secs(5),
    ));

    stop_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ShutdownOutcome::Drained);
}

#[tokio::test]
async fn test_grace_period_bounds_stuck_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let entered = Arc::new(Notify::new());
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(serve_with_grace(
        listener,
        app(entered.clone()),
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_millis(200),
    ));

    let client = tokio::spawn(async move {
        reqwest::get(format!("http://{}/stuck", addr)).await
    });
    entered.notified().await;

    let started = std::time::Instant::now();
    stop_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert_eq!(outcome, ShutdownOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(5));
    client.abort();
}

#[tokio::test]
async fn test_serves_requests_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(serve_with_grace(
        listener,
        app(Arc::new(Notify::new())),
        async move {
            let _ = stop_rx.await;
        },
        Duration::from_millis(500),
    ));

    let body = reqwest::get(format!("http://{}/ok", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "ok");

    stop_tx.send(()).unwrap();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();
    assert!(matches!(
        outcome,
        ShutdownOutcome::Drained | ShutdownOutcome::Forced
    ));
}
