//! Seams to the collaborators the workflow depends on: request storage, the
//! approver directory, object storage, the notifier and the rate-limit log.
//! In-memory adapters live in [`crate::memory`]; SQL adapters in `portaflow-db`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::approver::{Approver, CompanyId, UserId};
use crate::domain::attachment::{BlobMetadata, StorageRef};
use crate::domain::request::{Request, RequestId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("version conflict on `{request_id}`: expected {expected}, found {found:?}")]
    Conflict { request_id: String, expected: u64, found: Option<u64> },
    #[error("record `{0}` already exists")]
    Duplicate(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store failure: {0}")]
    Backend(String),
    #[error("stored record is invalid: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn load(&self, id: &RequestId) -> Result<Option<Request>, StoreError>;

    async fn insert(&self, request: &Request) -> Result<(), StoreError>;

    /// Persists `request` only if the stored version still equals
    /// `expected_version`; otherwise fails with [`StoreError::Conflict`].
    async fn update(&self, request: &Request, expected_version: u64) -> Result<(), StoreError>;

    async fn list_awaiting(&self, approver_id: &UserId) -> Result<Vec<Request>, StoreError>;

    async fn list_by_requester(&self, requester_id: &UserId) -> Result<Vec<Request>, StoreError>;
}

#[async_trait]
pub trait ApproverDirectory: Send + Sync {
    /// Every directory entry in the company, eligible or not.
    async fn list_approvers(&self, company_id: &CompanyId) -> Result<Vec<Approver>, StoreError>;

    async fn list_eligible_approvers(
        &self,
        company_id: &CompanyId,
    ) -> Result<Vec<Approver>, StoreError> {
        let mut eligible: Vec<Approver> = self
            .list_approvers(company_id)
            .await?
            .into_iter()
            .filter(|approver| approver.can_approve)
            .collect();
        eligible.sort_by(|left, right| {
            left.level.cmp(&right.level).then_with(|| left.name.cmp(&right.name))
        });
        Ok(eligible)
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_blob(
        &self,
        bytes: &[u8],
        metadata: &BlobMetadata,
    ) -> Result<StorageRef, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptDecision {
    pub allowed: bool,
    /// Oldest attempt still inside the window after expiry, if any.
    pub oldest_in_window: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait AttemptLog: Send + Sync {
    /// Expires entries older than `window`, counts the rest, and records `now`
    /// only when the count is below `max_attempts`. Must be atomic per key.
    async fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<AttemptDecision, StoreError>;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    Submitted { request_id: RequestId, notify: UserId },
    AdvancedToStage { request_id: RequestId, stage_index: u32, notify: UserId },
    Approved { request_id: RequestId, notify: UserId },
    Rejected { request_id: RequestId, notify: UserId },
    Cancelled { request_id: RequestId, notify: UserId },
}

impl WorkflowEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "workflow.notify.submitted",
            Self::AdvancedToStage { .. } => "workflow.notify.advanced",
            Self::Approved { .. } => "workflow.notify.approved",
            Self::Rejected { .. } => "workflow.notify.rejected",
            Self::Cancelled { .. } => "workflow.notify.cancelled",
        }
    }

    pub fn request_id(&self) -> &RequestId {
        match self {
            Self::Submitted { request_id, .. }
            | Self::AdvancedToStage { request_id, .. }
            | Self::Approved { request_id, .. }
            | Self::Rejected { request_id, .. }
            | Self::Cancelled { request_id, .. } => request_id,
        }
    }

    pub fn recipient(&self) -> &UserId {
        match self {
            Self::Submitted { notify, .. }
            | Self::AdvancedToStage { notify, .. }
            | Self::Approved { notify, .. }
            | Self::Rejected { notify, .. }
            | Self::Cancelled { notify, .. } => notify,
        }
    }
}

/// Fire-and-forget. Implementations must not block the caller.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: WorkflowEvent);
}
