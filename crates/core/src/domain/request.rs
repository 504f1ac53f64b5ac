use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::approver::{ApproverChain, CompanyId, UserId};
use crate::domain::attachment::Attachment;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(format!("REQ-{}", Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Draft,
    InReview,
    Approved,
    Rejected,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "in_review" => Some(Self::InReview),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Cancelled)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Accepts the portal's Portuguese labels as well.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "low" | "baixa" => Some(Self::Low),
            "medium" | "media" | "média" => Some(Self::Medium),
            "high" | "alta" => Some(Self::High),
            _ => None,
        }
    }
}

impl TryFrom<String> for Priority {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown priority `{value}`"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approve,
    Reject,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// Raw form fields as submitted, before validation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmissionFields {
    pub title: String,
    pub description: String,
    pub period: String,
    #[serde(rename = "type")]
    pub request_type: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub requested_amount: Option<String>,
}

/// Validated, trimmed request content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContent {
    pub title: String,
    pub description: String,
    pub period: String,
    pub request_type: String,
    pub priority: Priority,
    pub justification: Option<String>,
    pub requested_amount: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub stage: u32,
    pub approver_id: UserId,
    pub verdict: Verdict,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: RequestId,
    pub requester_id: UserId,
    pub company_id: CompanyId,
    pub content: RequestContent,
    pub status: RequestStatus,
    pub stage_index: u32,
    pub current_approver_id: Option<UserId>,
    pub approver_chain: ApproverChain,
    pub completed_approvers: Vec<UserId>,
    pub decisions: Vec<DecisionRecord>,
    pub attachments: Vec<Attachment>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    pub fn is_participant(&self, actor: &UserId) -> bool {
        &self.requester_id == actor || self.approver_chain.contains(actor)
    }

    /// Checks the stage bookkeeping against the status. Storage adapters run
    /// this on every decoded row.
    pub fn invariant_violation(&self) -> Option<String> {
        let chain = self.approver_chain.as_slice();
        let completed = self.completed_approvers.len();

        if chain.is_empty() {
            return Some("approver chain is empty".to_string());
        }
        if self.stage_index < 1 || self.stage_index as usize > chain.len() + 1 {
            return Some(format!("stage index {} out of range", self.stage_index));
        }
        if completed + 1 != self.stage_index as usize {
            return Some(format!(
                "{completed} completed approvers inconsistent with stage index {}",
                self.stage_index
            ));
        }
        if !chain.starts_with(&self.completed_approvers) {
            return Some("completed approvers are not a prefix of the chain".to_string());
        }

        match self.status {
            RequestStatus::Draft => Some("draft requests are never persisted".to_string()),
            RequestStatus::InReview => {
                if completed >= chain.len() {
                    return Some("in-review request has no pending stage".to_string());
                }
                if self.current_approver_id.as_ref() != self.approver_chain.at_stage(self.stage_index)
                {
                    return Some("current approver does not match stage".to_string());
                }
                None
            }
            RequestStatus::Approved => {
                if completed != chain.len() || self.current_approver_id.is_some() {
                    return Some("approved request must have every stage completed".to_string());
                }
                None
            }
            RequestStatus::Rejected => {
                if self.current_approver_id.is_some() {
                    return Some("rejected request still has a current approver".to_string());
                }
                None
            }
            RequestStatus::Cancelled => {
                if completed != 0 {
                    return Some("cancelled request has recorded approvals".to_string());
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Priority, RequestStatus, SubmissionFields};

    #[test]
    fn status_round_trips_through_storage_labels() {
        for status in [
            RequestStatus::Draft,
            RequestStatus::InReview,
            RequestStatus::Approved,
            RequestStatus::Rejected,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(RequestStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RequestStatus::parse("pending"), None);
    }

    #[test]
    fn priority_accepts_portuguese_labels() {
        assert_eq!(Priority::parse("Alta"), Some(Priority::High));
        assert_eq!(Priority::parse("média"), Some(Priority::Medium));
        assert_eq!(Priority::parse("baixa"), Some(Priority::Low));
        assert_eq!(Priority::parse("urgente"), None);
    }

    #[test]
    fn submission_fields_deserialize_portuguese_priority() {
        let fields: SubmissionFields =
            serde_json::from_str(r#"{ "title": "Viagem", "priority": "Alta" }"#).expect("fields");
        assert_eq!(fields.priority, Priority::High);

        let fields: SubmissionFields = serde_json::from_str(r#"{ "priority": "low" }"#).expect("fields");
        assert_eq!(fields.priority, Priority::Low);
        assert_eq!(serde_json::to_string(&Priority::Medium).expect("json"), r#""medium""#);

        let unknown = serde_json::from_str::<SubmissionFields>(r#"{ "priority": "urgente" }"#);
        assert!(unknown.is_err());
    }
}
