use thiserror::Error;

use portaflow_core::ports::StoreError;

pub mod approver;
pub mod attempt;
pub mod request;

pub use approver::SqlApproverDirectory;
pub use attempt::SqlAttemptLog;
pub use request::SqlRequestStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(db)) => {
                let message = db.message().to_string();
                if is_busy(&message) {
                    StoreError::Unavailable(message)
                } else if db.is_unique_violation() {
                    StoreError::Duplicate(message)
                } else {
                    StoreError::Backend(message)
                }
            }
            RepositoryError::Database(
                error @ (sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Io(_)
                | sqlx::Error::WorkerCrashed),
            ) => StoreError::Unavailable(error.to_string()),
            RepositoryError::Database(error) => StoreError::Backend(error.to_string()),
            RepositoryError::Decode(message) => StoreError::Corrupt(message),
        }
    }
}

fn is_busy(message: &str) -> bool {
    message.contains("database is locked") || message.contains("database is busy")
}

pub(crate) fn decode_error(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
