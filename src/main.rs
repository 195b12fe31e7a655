use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use sitecontrol_backend::app;
use sitecontrol_backend::app_state::AppState;
use sitecontrol_backend::config::Config;
use sitecontrol_backend::db::pool::{get_db_pool, run_migrations};
use sitecontrol_backend::middleware::auth::create_permission_cache;
use sitecontrol_backend::utils::notification::DbNotificationSink;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::init()?;

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_writer(non_blocking.and(std::io::stdout))
        .init();

    let pool = get_db_pool(&config)
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool)
        .await
        .context("Failed to apply database migrations")?;

    let state = AppState {
        pool: pool.clone(),
        notifier: Arc::new(DbNotificationSink::new(pool.clone())),
        policy: Arc::new(config.transition_policy.clone()),
        permission_cache: create_permission_cache(config.permission_cache_ttl_secs),
    };

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Server running on http://{}", config.bind_addr);

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, shutting down...");
}
