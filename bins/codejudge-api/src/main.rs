mod handlers;
mod metrics;
mod routes;

use anyhow::Context;
use axum::Router;
use codejudge_common::config::HarnessConfig;
use codejudge_common::redis::QUEUE_NAME;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub redis: ConnectionManager,
    pub queue_name: String,
    /// Submission limits mirrored from the worker defaults
    pub limits: HarnessConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if std::env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false) {
        builder.json().init();
    } else {
        builder.init();
    }

    info!("codejudge API booting...");
    metrics::register_metrics();

    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let queue_name = std::env::var("CODEJUDGE_QUEUE").unwrap_or_else(|_| QUEUE_NAME.to_string());

    let client = redis::Client::open(redis_url.as_str()).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(client)
        .await
        .context("Failed to connect to Redis")?;

    info!("Connected to Redis: {}", redis_url);

    let state = Arc::new(AppState {
        redis: redis_conn,
        queue_name,
        limits: HarnessConfig::default(),
    });

    let app = Router::new().merge(routes::routes()).with_state(state);

    let addr = std::env::var("CODEJUDGE_API_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Ready to accept jobs");

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
