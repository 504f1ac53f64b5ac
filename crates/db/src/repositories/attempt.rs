use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use portaflow_core::ports::{AttemptDecision, AttemptLog, StoreError};

use super::RepositoryError;
use crate::DbPool;

/// Sliding-window attempt log in `rate_limit_attempt`.
///
/// The expiring DELETE runs first inside the transaction so the write lock is
/// taken before counting; concurrent callers on the same database serialize.
pub struct SqlAttemptLog {
    pool: DbPool,
}

impl SqlAttemptLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn check_and_record_tx(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<AttemptDecision, RepositoryError> {
        let now_ms = now.timestamp_millis();
        let cutoff_ms = (now - window).timestamp_millis();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM rate_limit_attempt WHERE attempt_key = ? AND attempted_at_ms <= ?")
            .bind(key)
            .bind(cutoff_ms)
            .execute(&mut *tx)
            .await?;

        let (count, oldest_ms): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(1), MIN(attempted_at_ms) FROM rate_limit_attempt WHERE attempt_key = ?",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        let allowed = count < i64::from(max_attempts);
        if allowed {
            sqlx::query("INSERT INTO rate_limit_attempt (attempt_key, attempted_at_ms) VALUES (?, ?)")
                .bind(key)
                .bind(now_ms)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let oldest_ms = if allowed { oldest_ms.or(Some(now_ms)) } else { oldest_ms };
        let oldest_in_window = oldest_ms.and_then(|ms| Utc.timestamp_millis_opt(ms).single());

        Ok(AttemptDecision { allowed, oldest_in_window })
    }
}

#[async_trait]
impl AttemptLog for SqlAttemptLog {
    async fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<AttemptDecision, StoreError> {
        Ok(self.check_and_record_tx(key, max_attempts, window, now).await?)
    }
}
