use std::sync::Arc;

use portaflow_core::audit::TracingAuditSink;
use portaflow_core::config::{AppConfig, ConfigError, LoadOptions};
use portaflow_core::workflow::{WorkflowPorts, WorkflowService, WorkflowSettings};
use portaflow_db::{connect, migrations, DbPool, SqlApproverDirectory, SqlAttemptLog, SqlRequestStore};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use crate::notifications::ChannelNotifier;
use crate::storage::FsBlobStore;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub workflow: Arc<WorkflowService>,
    pub dispatcher: JoinHandle<usize>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("attachment storage directory `{path}` is not usable: {source}")]
    Storage { path: String, source: std::io::Error },
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let storage_dir = &config.attachments.storage_dir;
    tokio::fs::create_dir_all(storage_dir).await.map_err(|source| BootstrapError::Storage {
        path: storage_dir.display().to_string(),
        source,
    })?;

    let (notifier, dispatcher) = ChannelNotifier::spawn();
    let ports = WorkflowPorts {
        store: Arc::new(SqlRequestStore::new(db_pool.clone())),
        directory: Arc::new(SqlApproverDirectory::new(db_pool.clone())),
        blobs: Arc::new(FsBlobStore::new(storage_dir.clone())),
        attempts: Arc::new(SqlAttemptLog::new(db_pool.clone())),
        notifier: Arc::new(notifier),
        audit: Arc::new(TracingAuditSink),
    };
    let workflow = Arc::new(WorkflowService::new(ports, WorkflowSettings::from_config(&config)));
    info!(
        event_name = "system.bootstrap.workflow_ready",
        correlation_id = "bootstrap",
        storage_dir = %storage_dir.display(),
        "workflow service wired"
    );

    Ok(Application { config, db_pool, workflow, dispatcher })
}
