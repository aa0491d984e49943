//! Tenant Gateway - Main entry point
//!
//! This binary loads configuration from the environment, wires the request
//! pipeline and serves it until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use tenant_gateway::{
    api::{create_http_client, serve_with_grace, Authenticator},
    build_router,
    core::config::LogFormat,
    AppState, Gateway, GatewayConfig, GatewayMetrics, InMemoryRevocationStore,
    RedisRevocationStore, RevocationStore, RouteTable,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<()> {
    // Load .env file if present (before reading any environment variables)
    dotenvy::dotenv().ok();

    let worker_threads = std::env::var("TOKIO_WORKER_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Custom time formatter that uses local timezone (respects TZ environment variable)
struct LocalTime;

impl tracing_subscriber::fmt::time::FormatTime for LocalTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn init_tracing(config: &GatewayConfig) {
    let no_color = std::env::var("NO_COLOR").is_ok();

    let default_filter = if config.is_production() {
        "info"
    } else {
        "info,tenant_gateway=debug"
    };
    let base_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    // Always suppress noisy HTTP library logs regardless of RUST_LOG setting
    let filter = tracing_subscriber::EnvFilter::new(format!(
        "{},hyper=warn,hyper::proto=warn,h2=warn,reqwest=warn",
        base_filter
    ));

    match config.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_timer(LocalTime))
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_timer(LocalTime)
                    .with_ansi(!no_color),
            )
            .init(),
    }
}

async fn connect_revocation_store(config: &GatewayConfig) -> Result<Arc<dyn RevocationStore>> {
    match &config.redis_url {
        Some(url) => {
            let store = RedisRevocationStore::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            store.ping().await.context("Failed to ping Redis")?;
            tracing::info!("Connected to Redis revocation store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!(
                "REDIS_URL not set, using in-process revocation store (logouts from the auth service will not be seen)"
            );
            Ok(Arc::new(InMemoryRevocationStore::new()))
        }
    }
}

async fn async_main() -> Result<()> {
    let config = GatewayConfig::from_env()?;
    init_tracing(&config);

    tracing::info!(
        environment = %config.environment,
        rate_limit_key = ?config.rate_limit.key,
        "Loaded gateway configuration"
    );

    let revocation = connect_revocation_store(&config).await?;
    let metrics = Arc::new(GatewayMetrics::new()?);
    let routes = RouteTable::from_env()?;
    tracing::info!("Route table loaded: {} routes", routes.len());

    let http_client = create_http_client(&config.upstream)?;
    let authenticator = Arc::new(Authenticator::new(&config.auth, revocation.clone()));
    let gateway = Arc::new(Gateway::new(
        &config,
        routes,
        authenticator,
        metrics.clone(),
        http_client,
    ));

    let state = AppState {
        gateway,
        metrics,
        revocation,
    };
    let app = build_router(state, config.enable_cors);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    tracing::info!("Starting API Gateway on {}", listener.local_addr()?);
    tracing::info!("Health endpoint: /health");
    tracing::info!("Metrics endpoint: /metrics");

    let outcome =
        serve_with_grace(listener, app, shutdown_signal(), config.shutdown_grace).await?;

    tracing::info!(?outcome, "API Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
