mod config;
mod handlers;
mod harness;
mod orchestrator;
mod reconcile;
mod routes;
mod sandbox;

use std::sync::Arc;

use redis::aio::ConnectionManager;
use tokio::net::TcpListener;
use tracing::info;

use crucible_common::context::RedisContextSource;
use crucible_common::records::RedisRecordSink;

use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::sandbox::SandboxRunner;

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub redis: ConnectionManager,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Crucible server booting...");

    let settings = Settings::load_or_default();
    info!(
        "Configured languages: {:?}",
        settings.configured_languages()
    );

    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let client = redis::Client::open(redis_url.as_str())?;
    let redis_conn = ConnectionManager::new(client).await?;
    info!("Connected to Redis: {}", redis_url);

    let sandbox = SandboxRunner::new(settings)?;
    let orchestrator = Orchestrator::new(
        Box::new(RedisContextSource::new(redis_conn.clone())),
        Box::new(sandbox),
        Box::new(RedisRecordSink::new(redis_conn.clone())),
    );

    let state = Arc::new(AppState {
        orchestrator,
        redis: redis_conn,
    });

    let app = axum::Router::new().merge(routes::routes()).with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {}", addr);
    info!("Ready to accept executions");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    Ok(())
}
