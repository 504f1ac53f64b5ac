use std::path::{Path, PathBuf};

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use portaflow_db::DbPool;
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    storage_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: HealthCheck,
    pub attachment_storage: HealthCheck,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool, storage_dir: PathBuf) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool, storage_dir })
}

/// 200 only when both the database and the attachment directory respond.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let attachment_storage = storage_check(&state.storage_dir).await;
    let ready = database.status == "ready" && attachment_storage.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        database,
        attachment_storage,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM approval_request").fetch_one(pool).await
    {
        Ok(count) => HealthCheck { status: "ready", detail: format!("{count} requests on record") },
        Err(error) => {
            warn!(
                event_name = "system.health.database_degraded",
                correlation_id = "health",
                error = %error,
                "health probe could not query the request table"
            );
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn storage_check(storage_dir: &Path) -> HealthCheck {
    match tokio::fs::metadata(storage_dir).await {
        Ok(metadata) if metadata.is_dir() => {
            HealthCheck { status: "ready", detail: "attachment directory available".to_string() }
        }
        Ok(_) => HealthCheck {
            status: "degraded",
            detail: format!("`{}` is not a directory", storage_dir.display()),
        },
        Err(error) => {
            warn!(
                event_name = "system.health.storage_degraded",
                correlation_id = "health",
                error = %error,
                "health probe could not stat the attachment directory"
            );
            HealthCheck { status: "degraded", detail: format!("attachment directory unavailable: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use portaflow_db::{connect_with_settings, migrations};

    use crate::health::{health, HealthState};

    #[tokio::test]
    async fn health_is_ready_with_migrated_database_and_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let state = HealthState { db_pool: pool.clone(), storage_dir: dir.path().to_path_buf() };
        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.detail, "0 requests on record");
        assert_eq!(payload.attachment_storage.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_degrades_when_schema_or_storage_is_missing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let state = HealthState { db_pool: pool.clone(), storage_dir: dir.path().join("missing") };
        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.attachment_storage.status, "degraded");

        pool.close().await;
    }
}
