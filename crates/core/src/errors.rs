use thiserror::Error;

use crate::approvals::ChainError;
use crate::flows::LifecycleError;
use crate::guards::{ContentIssue, FileRejection};
use crate::ports::StoreError;

const STATE_MACHINE_MESSAGE: &str = "Esta solicitação não pode mais ser processada desta forma.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("validation failed with {} issue(s)", .0.len())]
    Validation(Vec<ContentIssue>),
    #[error("content rejected by unsafe-content screen")]
    SecurityRejection,
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("{} file(s) rejected", .0.len())]
    FilesRejected(Vec<FileRejection>),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("object storage failure: {0}")]
    Storage(String),
    #[error("deadline exceeded during {0}")]
    DeadlineExceeded(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<ChainError> for ApplicationError {
    fn from(value: ChainError) -> Self {
        Self::Domain(DomainError::Chain(value))
    }
}

impl From<LifecycleError> for ApplicationError {
    fn from(value: LifecycleError) -> Self {
        Self::Domain(DomainError::Lifecycle(value))
    }
}

impl From<StoreError> for ApplicationError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { request_id, .. } => {
                Self::Domain(DomainError::Lifecycle(LifecycleError::StaleVersion {
                    request_id: crate::domain::request::RequestId(request_id),
                }))
            }
            StoreError::Corrupt(message) => Self::Domain(DomainError::InvariantViolation(message)),
            other => Self::Persistence(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, details: Vec<String>, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("too many requests: retry after {retry_after_secs}s")]
    TooManyRequests { retry_after_secs: u64, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "A solicitação não pôde ser processada. Verifique os dados e tente novamente."
            }
            Self::Forbidden { .. } | Self::Conflict { .. } => STATE_MACHINE_MESSAGE,
            Self::NotFound { .. } => "Solicitação não encontrada.",
            Self::TooManyRequests { .. } => {
                "Muitas tentativas em pouco tempo. Aguarde e tente novamente."
            }
            Self::ServiceUnavailable { .. } => {
                "O serviço está temporariamente indisponível. Tente novamente em instantes."
            }
            Self::Internal { .. } => "Ocorreu um erro interno inesperado.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::TooManyRequests { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    /// Field- or file-scoped messages the caller can act on.
    pub fn details(&self) -> &[String] {
        match self {
            Self::BadRequest { details, .. } => details,
            _ => &[],
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::TooManyRequests { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Stable machine-readable class for logs and CLI output.
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::SecurityRejection => "security_rejection",
            Self::RateLimited { .. } => "rate_limited",
            Self::FilesRejected(_) => "files_rejected",
            Self::Domain(DomainError::Chain(_)) => "invalid_chain",
            Self::Domain(DomainError::Lifecycle(LifecycleError::NotFound { .. })) => "not_found",
            Self::Domain(DomainError::Lifecycle(LifecycleError::UnauthorizedActor { .. })) => {
                "unauthorized_actor"
            }
            Self::Domain(DomainError::Lifecycle(LifecycleError::WrongState { .. })) => {
                "wrong_state"
            }
            Self::Domain(DomainError::Lifecycle(LifecycleError::StaleVersion { .. })) => {
                "stale_version"
            }
            Self::Domain(DomainError::Lifecycle(LifecycleError::InvalidChain)) => "invalid_chain",
            Self::Domain(DomainError::InvariantViolation(_)) => "invariant_violation",
            Self::Persistence(_) => "persistence",
            Self::Storage(_) => "storage",
            Self::DeadlineExceeded(_) => "deadline_exceeded",
            Self::Configuration(_) => "configuration",
        }
    }
}

const UNASSIGNED: &str = "unassigned";

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = UNASSIGNED.to_owned();
        match value {
            ApplicationError::Validation(issues) => Self::BadRequest {
                message: "validation failed".to_owned(),
                details: issues.iter().map(ContentIssue::message).collect(),
                correlation_id,
            },
            ApplicationError::SecurityRejection => Self::BadRequest {
                message: "content rejected".to_owned(),
                details: vec![ContentIssue::UnsafeContent.message()],
                correlation_id,
            },
            ApplicationError::RateLimited { retry_after_secs } => {
                Self::TooManyRequests { retry_after_secs, correlation_id }
            }
            ApplicationError::FilesRejected(rejections) => Self::BadRequest {
                message: "attachments rejected".to_owned(),
                details: rejections
                    .iter()
                    .map(|rejection| format!("{}: {}", rejection.file.file_name, rejection.reason.message()))
                    .collect(),
                correlation_id,
            },
            ApplicationError::Domain(DomainError::Chain(error)) => Self::BadRequest {
                message: error.to_string(),
                details: vec![error.user_message()],
                correlation_id,
            },
            ApplicationError::Domain(DomainError::Lifecycle(error)) => match error {
                LifecycleError::NotFound { .. } => {
                    Self::NotFound { message: error.to_string(), correlation_id }
                }
                LifecycleError::UnauthorizedActor { .. } => {
                    Self::Forbidden { message: error.to_string(), correlation_id }
                }
                LifecycleError::WrongState { .. } | LifecycleError::StaleVersion { .. } => {
                    Self::Conflict { message: error.to_string(), correlation_id }
                }
                LifecycleError::InvalidChain => Self::BadRequest {
                    message: error.to_string(),
                    details: vec![ChainError::Empty.user_message()],
                    correlation_id,
                },
            },
            ApplicationError::Domain(DomainError::InvariantViolation(message))
            | ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
            ApplicationError::Persistence(message) | ApplicationError::Storage(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::DeadlineExceeded(operation) => Self::ServiceUnavailable {
                message: format!("deadline exceeded during {operation}"),
                correlation_id,
            },
        }
    }
}
