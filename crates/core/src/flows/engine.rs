use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::approver::{ApproverChain, CompanyId, UserId};
use crate::domain::attachment::Attachment;
use crate::domain::request::{
    DecisionRecord, Request, RequestContent, RequestId, RequestStatus, Verdict,
};
use crate::flows::states::{LifecycleEvent, TransitionOutcome};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("approver chain is empty")]
    InvalidChain,
    #[error("request `{request_id}` not found")]
    NotFound { request_id: RequestId },
    #[error("request in state {} cannot accept this transition", status.as_str())]
    WrongState { status: RequestStatus },
    #[error("actor `{actor_id}` may not act on this request")]
    UnauthorizedActor { actor_id: UserId },
    #[error("request `{request_id}` changed since it was read")]
    StaleVersion { request_id: RequestId },
}

/// Everything a request needs before it enters review.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDraft {
    pub id: RequestId,
    pub requester_id: UserId,
    pub company_id: CompanyId,
    pub content: RequestContent,
    pub attachments: Vec<Attachment>,
}

/// Pure transition functions over [`Request`]. Every transition returns a new
/// snapshot with `version` bumped by one; the input is never mutated, so a
/// failed transition leaves the caller's copy untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestLifecycle;

impl RequestLifecycle {
    /// Draft -> InReview in one step; a draft is never handed back.
    pub fn submit(
        &self,
        draft: RequestDraft,
        chain: ApproverChain,
        now: DateTime<Utc>,
    ) -> Result<(Request, TransitionOutcome), LifecycleError> {
        let first_approver = chain.at_stage(1).cloned().ok_or(LifecycleError::InvalidChain)?;

        let request = Request {
            id: draft.id,
            requester_id: draft.requester_id,
            company_id: draft.company_id,
            content: draft.content,
            status: RequestStatus::InReview,
            stage_index: 1,
            current_approver_id: Some(first_approver),
            approver_chain: chain,
            completed_approvers: Vec::new(),
            decisions: Vec::new(),
            attachments: draft.attachments,
            version: 1,
            created_at: now,
            updated_at: now,
        };

        let outcome = TransitionOutcome {
            from: RequestStatus::Draft,
            to: RequestStatus::InReview,
            event: LifecycleEvent::Submitted,
            stage_before: 1,
            stage_after: 1,
        };
        Ok((request, outcome))
    }

    pub fn decide(
        &self,
        current: &Request,
        actor_id: &UserId,
        verdict: Verdict,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(Request, TransitionOutcome), LifecycleError> {
        if current.status != RequestStatus::InReview {
            return Err(LifecycleError::WrongState { status: current.status });
        }
        if current.current_approver_id.as_ref() != Some(actor_id) {
            return Err(LifecycleError::UnauthorizedActor { actor_id: actor_id.clone() });
        }

        let stage_before = current.stage_index;
        let mut next = current.clone();
        next.decisions.push(DecisionRecord {
            stage: stage_before,
            approver_id: actor_id.clone(),
            verdict,
            comment: comment.map(str::trim).filter(|text| !text.is_empty()).map(str::to_string),
            decided_at: now,
        });

        let event = match verdict {
            Verdict::Reject => {
                next.status = RequestStatus::Rejected;
                next.current_approver_id = None;
                LifecycleEvent::Rejected
            }
            Verdict::Approve => {
                next.completed_approvers.push(actor_id.clone());
                next.stage_index += 1;
                match next.approver_chain.at_stage(next.stage_index).cloned() {
                    Some(following) => next.current_approver_id = Some(following),
                    None => {
                        next.status = RequestStatus::Approved;
                        next.current_approver_id = None;
                    }
                }
                LifecycleEvent::StageApproved
            }
        };

        next.version += 1;
        next.updated_at = now;

        let outcome = TransitionOutcome {
            from: current.status,
            to: next.status,
            event,
            stage_before,
            stage_after: next.stage_index,
        };
        Ok((next, outcome))
    }

    pub fn cancel(
        &self,
        current: &Request,
        requester_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<(Request, TransitionOutcome), LifecycleError> {
        if &current.requester_id != requester_id {
            return Err(LifecycleError::UnauthorizedActor { actor_id: requester_id.clone() });
        }
        if current.status != RequestStatus::InReview || !current.completed_approvers.is_empty() {
            return Err(LifecycleError::WrongState { status: current.status });
        }

        let mut next = current.clone();
        next.status = RequestStatus::Cancelled;
        next.current_approver_id = None;
        next.version += 1;
        next.updated_at = now;

        let outcome = TransitionOutcome {
            from: current.status,
            to: next.status,
            event: LifecycleEvent::Cancelled,
            stage_before: current.stage_index,
            stage_after: next.stage_index,
        };
        Ok((next, outcome))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::{LifecycleError, RequestDraft, RequestLifecycle};
    use crate::domain::approver::{ApproverChain, CompanyId, UserId};
    use crate::domain::request::{
        Priority, Request, RequestContent, RequestId, RequestStatus, Verdict,
    };
    use crate::flows::states::LifecycleEvent;

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn draft() -> RequestDraft {
        RequestDraft {
            id: RequestId("REQ-0001".to_owned()),
            requester_id: user("solicitante"),
            company_id: CompanyId("acme".to_owned()),
            content: RequestContent {
                title: "Compra de Equipamento".to_owned(),
                description: "Notebooks".to_owned(),
                period: "Janeiro/2024".to_owned(),
                request_type: "compra".to_owned(),
                priority: Priority::High,
                justification: None,
                requested_amount: None,
            },
            attachments: Vec::new(),
        }
    }

    fn submitted(chain: &[&str]) -> Request {
        let chain = ApproverChain::new(chain.iter().map(|id| user(id)).collect());
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).single().expect("timestamp");
        RequestLifecycle.submit(draft(), chain, now).expect("submit").0
    }

    fn assert_consistent(request: &Request) {
        assert_eq!(request.invariant_violation(), None, "request: {request:?}");
    }

    #[test]
    fn submit_enters_review_at_first_stage() {
        let request = submitted(&["L1", "L2"]);

        assert_eq!(request.status, RequestStatus::InReview);
        assert_eq!(request.stage_index, 1);
        assert_eq!(request.current_approver_id, Some(user("L1")));
        assert_eq!(request.version, 1);
        assert_consistent(&request);
    }

    #[test]
    fn submit_with_empty_chain_fails() {
        let error = RequestLifecycle
            .submit(draft(), ApproverChain::new(Vec::new()), Utc::now())
            .expect_err("empty chain");
        assert_eq!(error, LifecycleError::InvalidChain);
    }

    #[test]
    fn approve_then_reject_walks_the_chain() {
        let request = submitted(&["L1", "L2"]);

        let (request, outcome) = RequestLifecycle
            .decide(&request, &user("L1"), Verdict::Approve, None, Utc::now())
            .expect("L1 approves");
        assert_eq!(outcome.event, LifecycleEvent::StageApproved);
        assert_eq!(request.stage_index, 2);
        assert_eq!(request.completed_approvers, vec![user("L1")]);
        assert_eq!(request.current_approver_id, Some(user("L2")));
        assert_consistent(&request);

        let (request, outcome) = RequestLifecycle
            .decide(&request, &user("L2"), Verdict::Reject, Some("orçamento insuficiente"), Utc::now())
            .expect("L2 rejects");
        assert_eq!(outcome.event, LifecycleEvent::Rejected);
        assert!(outcome.is_terminal());
        assert_eq!(request.status, RequestStatus::Rejected);
        assert_eq!(request.current_approver_id, None);
        assert_eq!(request.stage_index, 2);
        assert_eq!(request.decisions[1].comment.as_deref(), Some("orçamento insuficiente"));
        assert_consistent(&request);

        for actor in ["L1", "L2", "solicitante"] {
            let error = RequestLifecycle
                .decide(&request, &user(actor), Verdict::Approve, None, Utc::now())
                .expect_err("terminal");
            assert_eq!(error, LifecycleError::WrongState { status: RequestStatus::Rejected });
        }
    }

    #[test]
    fn final_approval_completes_the_chain() {
        let mut request = submitted(&["L1", "L2", "L3"]);
        let mut stages = vec![request.stage_index];

        for approver in ["L1", "L2", "L3"] {
            request = RequestLifecycle
                .decide(&request, &user(approver), Verdict::Approve, None, Utc::now())
                .expect("approve")
                .0;
            stages.push(request.stage_index);
            assert_consistent(&request);
        }

        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.completed_approvers, request.approver_chain.as_slice().to_vec());
        assert_eq!(request.current_approver_id, None);
        assert_eq!(request.version, 4);
        assert!(stages.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(stages.last().copied(), Some(4));
    }

    #[test]
    fn out_of_turn_decisions_leave_request_unchanged() {
        let request = submitted(&["L1", "L2"]);
        let before = request.clone();

        for actor in ["L2", "solicitante", "intruso"] {
            let error = RequestLifecycle
                .decide(&request, &user(actor), Verdict::Approve, None, Utc::now())
                .expect_err("out of turn");
            assert_eq!(error, LifecycleError::UnauthorizedActor { actor_id: user(actor) });
        }
        assert_eq!(request, before);
    }

    #[test]
    fn same_actor_cannot_decide_twice_on_one_stage() {
        let request = submitted(&["L1", "L2"]);
        let (advanced, _) = RequestLifecycle
            .decide(&request, &user("L1"), Verdict::Approve, None, Utc::now())
            .expect("first decision");

        let error = RequestLifecycle
            .decide(&advanced, &user("L1"), Verdict::Approve, None, Utc::now())
            .expect_err("L1 already acted");
        assert!(matches!(error, LifecycleError::UnauthorizedActor { .. }));
    }

    #[test]
    fn rejection_at_stage_k_never_records_later_approvers() {
        for reject_at in 1..=3_u32 {
            let mut request = submitted(&["L1", "L2", "L3"]);
            for stage in 1..reject_at {
                let approver = user(&format!("L{stage}"));
                request = RequestLifecycle
                    .decide(&request, &approver, Verdict::Approve, None, Utc::now())
                    .expect("approve")
                    .0;
            }
            let rejecter = user(&format!("L{reject_at}"));
            request = RequestLifecycle
                .decide(&request, &rejecter, Verdict::Reject, None, Utc::now())
                .expect("reject")
                .0;

            assert_eq!(request.stage_index, reject_at);
            assert_eq!(request.completed_approvers.len() as u32, reject_at - 1);
            assert!(!request.completed_approvers.contains(&rejecter));
            assert_consistent(&request);
        }
    }

    #[test]
    fn cancel_is_limited_to_requester_before_any_approval() {
        let request = submitted(&["L1", "L2"]);
        let later = request.created_at + Duration::minutes(5);

        let error = RequestLifecycle.cancel(&request, &user("L1"), later).expect_err("not requester");
        assert_eq!(error, LifecycleError::UnauthorizedActor { actor_id: user("L1") });

        let (cancelled, outcome) =
            RequestLifecycle.cancel(&request, &user("solicitante"), later).expect("cancel");
        assert_eq!(cancelled.status, RequestStatus::Cancelled);
        assert_eq!(cancelled.current_approver_id, None);
        assert_eq!(cancelled.updated_at, later);
        assert_eq!(outcome.event, LifecycleEvent::Cancelled);
        assert_consistent(&cancelled);

        let (advanced, _) = RequestLifecycle
            .decide(&request, &user("L1"), Verdict::Approve, None, later)
            .expect("approve");
        let error =
            RequestLifecycle.cancel(&advanced, &user("solicitante"), later).expect_err("approved once");
        assert_eq!(error, LifecycleError::WrongState { status: RequestStatus::InReview });
    }

    #[test]
    fn blank_comments_are_not_recorded() {
        let request = submitted(&["L1"]);
        let (approved, _) = RequestLifecycle
            .decide(&request, &user("L1"), Verdict::Approve, Some("   "), Utc::now())
            .expect("approve");

        assert_eq!(approved.status, RequestStatus::Approved);
        assert_eq!(approved.decisions[0].comment, None);
    }
}
