mod api;
mod bootstrap;
mod health;
mod notifications;
mod storage;

use std::time::Duration;

use anyhow::Result;
use portaflow_core::config::{AppConfig, LoadOptions};

fn init_logging(config: &AppConfig) {
    use portaflow_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Logging must be up before bootstrap emits anything.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);

    let router = api::router(
        api::ApiState::new(app.workflow.clone(), &app.config.auth.gateway_token),
        api::body_limit(&app.config.attachments),
    )
    .merge(health::router(app.db_pool.clone(), app.config.attachments.storage_dir.clone()));

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        bind_address = %address,
        "portaflow-server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        "portaflow-server stopping"
    );

    // The dispatcher exits once every notifier handle is gone.
    drop(app.workflow);
    match tokio::time::timeout(grace, app.dispatcher).await {
        Ok(Ok(delivered)) => tracing::info!(
            event_name = "system.server.notifications_drained",
            correlation_id = "shutdown",
            delivered,
            "notification dispatcher drained"
        ),
        Ok(Err(error)) => tracing::warn!(
            event_name = "system.server.notifications_failed",
            correlation_id = "shutdown",
            error = %error,
            "notification dispatcher task failed"
        ),
        Err(_) => tracing::warn!(
            event_name = "system.server.notifications_timeout",
            correlation_id = "shutdown",
            grace_secs = grace.as_secs(),
            "notification dispatcher did not drain in time"
        ),
    }
    app.db_pool.close().await;

    Ok(())
}

async fn wait_for_shutdown() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(
            event_name = "system.server.signal_error",
            correlation_id = "shutdown",
            error = %error,
            "failed to listen for shutdown signal"
        );
    }
}
