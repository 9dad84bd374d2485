pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod runner;
pub mod sandbox;
pub mod verdict;
pub mod workspace;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::sync::Semaphore;

use crate::engine::{
    api::routes, config::JudgeConfig, metrics::MetricsRegistry, verdict::VerdictEngine,
};

pub async fn run() -> anyhow::Result<()> {
    let config = JudgeConfig::from_env();
    init_tracing(&config);

    let engine = Arc::new(VerdictEngine::from_config(&config));
    let metrics = Arc::new(MetricsRegistry::new());
    let limits = engine.limits();
    tracing::info!(
        languages = ?engine.languages(),
        run_timeout_ms = limits.run_timeout_ms,
        compile_timeout_ms = limits.compile_timeout_ms,
        max_output_chars = limits.max_output_chars,
        workspace_root = %config.workspace_root.display(),
        max_concurrent_judges = config.max_concurrent_judges,
        "judge engine configured"
    );

    let permits = Arc::new(Semaphore::new(config.max_concurrent_judges));
    let app: Router = routes(engine, metrics, permits.clone());
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let local = listener
        .local_addr()
        .unwrap_or(SocketAddr::from(([0, 0, 0, 0], 0)));
    tracing::info!(bind = %local, "judge service ready");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(permits))
        .await
        .context("judge server error")?;
    Ok(())
}

async fn shutdown_signal(permits: Arc<Semaphore>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    // Queued calls get 503; calls already holding a permit finish.
    permits.close();
    tracing::info!("shutdown requested, draining in-flight judging calls");
}

fn init_tracing(config: &JudgeConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .init();
}
