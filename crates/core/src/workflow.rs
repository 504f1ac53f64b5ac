//! Orchestration of the approval workflow: guards first, then the chain
//! builder and lifecycle, then persistence, audit and notification.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::approvals::ApproverChainBuilder;
use crate::audit::{AuditCategory, AuditContext, AuditOutcome, AuditSink};
use crate::config::AppConfig;
use crate::domain::approver::{Approver, CompanyId, UserId};
use crate::domain::attachment::{Attachment, BlobMetadata, FileCandidate, FileUpload};
use crate::domain::request::{Request, RequestId, RequestStatus, SubmissionFields, Verdict};
use crate::errors::ApplicationError;
use crate::flows::{LifecycleError, LifecycleEvent, RequestDraft, RequestLifecycle, TransitionOutcome};
use crate::guards::{
    AttachmentGuard, AttachmentPolicy, ContentIssue, ContentValidator, RateLimitOutcome,
    RateLimitRule, RateLimiter, DECIDE_ACTION, SUBMIT_ACTION,
};
use crate::ports::{
    ApproverDirectory, AttemptLog, BlobStore, Notifier, RequestStore, StoreError, WorkflowEvent,
};
use crate::retry::RetryPolicy;

/// External collaborators the workflow talks to.
#[derive(Clone)]
pub struct WorkflowPorts {
    pub store: Arc<dyn RequestStore>,
    pub directory: Arc<dyn ApproverDirectory>,
    pub blobs: Arc<dyn BlobStore>,
    pub attempts: Arc<dyn AttemptLog>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub attachments: AttachmentPolicy,
    pub submit_limit: RateLimitRule,
    pub decide_limit: RateLimitRule,
    pub retry: RetryPolicy,
    pub default_deadline: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            attachments: AttachmentPolicy::default(),
            submit_limit: RateLimitRule { max_attempts: 10, window_minutes: 60 },
            decide_limit: RateLimitRule { max_attempts: 30, window_minutes: 60 },
            retry: RetryPolicy::default(),
            default_deadline: Duration::from_secs(10),
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            attachments: config.attachments.policy(),
            submit_limit: config.rate_limit.submit_rule(),
            decide_limit: config.rate_limit.decide_rule(),
            retry: config.retry.policy(),
            default_deadline: config.retry.deadline(),
        }
    }
}

/// Who is calling, as asserted by the identity gateway.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub actor_id: UserId,
    pub actor_email: Option<String>,
    pub correlation_id: String,
    pub deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(actor_id: UserId, correlation_id: impl Into<String>) -> Self {
        Self { actor_id, actor_email: None, correlation_id: correlation_id.into(), deadline: None }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.actor_email = Some(email.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    fn audit(&self) -> AuditContext {
        AuditContext::new(None, self.correlation_id.clone(), self.actor_id.to_string())
    }
}

#[derive(Clone, Debug)]
pub struct SubmitCommand {
    pub company_id: CompanyId,
    pub fields: SubmissionFields,
    pub approver_ids: Vec<UserId>,
    pub files: Vec<FileUpload>,
}

#[derive(Clone, Debug)]
pub struct DecideCommand {
    pub request_id: RequestId,
    pub verdict: Verdict,
    pub comment: Option<String>,
    /// Stage the caller saw when it rendered the decision; a mismatch means
    /// someone else moved the request first.
    pub expected_stage: Option<u32>,
}

pub struct WorkflowService {
    ports: WorkflowPorts,
    settings: WorkflowSettings,
    validator: ContentValidator,
    attachments: AttachmentGuard,
    limiter: RateLimiter,
    chains: ApproverChainBuilder,
    lifecycle: RequestLifecycle,
}

impl WorkflowService {
    pub fn new(ports: WorkflowPorts, settings: WorkflowSettings) -> Self {
        Self {
            limiter: RateLimiter::new(ports.attempts.clone()),
            attachments: AttachmentGuard::new(settings.attachments.clone()),
            validator: ContentValidator,
            chains: ApproverChainBuilder,
            lifecycle: RequestLifecycle,
            ports,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub async fn submit(
        &self,
        ctx: &CallContext,
        command: SubmitCommand,
    ) -> Result<Request, ApplicationError> {
        let deadline = self.deadline(ctx);
        let audit = ctx.audit();

        self.throttle(ctx, SUBMIT_ACTION, self.settings.submit_limit, deadline).await?;

        let content = match self.validator.accept(&command.fields) {
            Ok(content) => content,
            Err(issues) => return Err(self.reject_content(ctx, "submit", issues)),
        };

        let candidates: Vec<FileCandidate> =
            command.files.iter().map(FileUpload::candidate).collect();
        let verdict = self.attachments.accept(0, &candidates);
        if !verdict.all_accepted() {
            warn!(
                event_name = "workflow.guard.files_rejected",
                correlation_id = %ctx.correlation_id,
                actor_id = %ctx.actor_id,
                rejected = verdict.rejected.len(),
                submitted = candidates.len(),
                "attachment batch rejected"
            );
            self.ports.audit.emit(
                audit
                    .event("workflow.guard.files_rejected", AuditCategory::Guard, AuditOutcome::Rejected)
                    .with_metadata("rejected", verdict.rejected.len().to_string()),
            );
            return Err(ApplicationError::FilesRejected(verdict.rejected));
        }

        let directory = self.company_directory(&command.company_id, deadline).await?;
        let selected = self.chains.resolve(&directory, &command.approver_ids)?;
        let chain = self.chains.build(&selected)?;

        let request_id = RequestId::generate();
        let audit = audit.for_request(&request_id);
        let attachments = self.store_files(&request_id, command.files, deadline).await?;

        let draft = RequestDraft {
            id: request_id.clone(),
            requester_id: ctx.actor_id.clone(),
            company_id: command.company_id,
            content,
            attachments,
        };
        let (request, outcome) = self.lifecycle.submit(draft, chain, Utc::now())?;

        self.write(ctx, &audit, "store.insert", self.ports.store.insert(&request), deadline).await?;

        info!(
            event_name = "workflow.request.submitted",
            correlation_id = %ctx.correlation_id,
            request_id = %request.id,
            actor_id = %ctx.actor_id,
            chain_length = request.approver_chain.len(),
            attachments = request.attachments.len(),
            "approval request submitted"
        );
        self.ports.audit.emit(transition_audit(&audit, "workflow.request.submitted", &outcome));
        self.notify(&request, &outcome);

        Ok(request)
    }

    pub async fn decide(
        &self,
        ctx: &CallContext,
        command: DecideCommand,
    ) -> Result<Request, ApplicationError> {
        let deadline = self.deadline(ctx);
        let audit = ctx.audit().for_request(&command.request_id);

        self.throttle(ctx, DECIDE_ACTION, self.settings.decide_limit, deadline).await?;

        let screened = self.validator.validate_comment(command.comment.as_deref());
        if !screened.ok {
            return Err(self.reject_content(ctx, "decide", screened.errors));
        }

        let current = self.load_existing(&command.request_id, deadline).await?;
        if let Some(expected_stage) = command.expected_stage {
            if current.status == RequestStatus::InReview && current.stage_index != expected_stage {
                let error = LifecycleError::StaleVersion { request_id: current.id.clone() };
                return Err(self.reject_transition(ctx, &audit, "decide", error));
            }
        }

        let (next, outcome) = self
            .lifecycle
            .decide(&current, &ctx.actor_id, command.verdict, command.comment.as_deref(), Utc::now())
            .map_err(|error| self.reject_transition(ctx, &audit, "decide", error))?;

        self.write(
            ctx,
            &audit,
            "store.update",
            self.ports.store.update(&next, current.version),
            deadline,
        )
        .await?;

        info!(
            event_name = "workflow.request.decided",
            correlation_id = %ctx.correlation_id,
            request_id = %next.id,
            actor_id = %ctx.actor_id,
            verdict = command.verdict.as_str(),
            stage_before = outcome.stage_before,
            stage_after = outcome.stage_after,
            status = next.status.as_str(),
            "approval decision recorded"
        );
        self.ports.audit.emit(
            transition_audit(&audit, "workflow.request.decided", &outcome)
                .with_metadata("verdict", command.verdict.as_str()),
        );
        self.notify(&next, &outcome);

        Ok(next)
    }

    pub async fn cancel(
        &self,
        ctx: &CallContext,
        request_id: &RequestId,
    ) -> Result<Request, ApplicationError> {
        let deadline = self.deadline(ctx);
        let audit = ctx.audit().for_request(request_id);

        self.throttle(ctx, DECIDE_ACTION, self.settings.decide_limit, deadline).await?;

        let current = self.load_existing(request_id, deadline).await?;
        let (next, outcome) = self
            .lifecycle
            .cancel(&current, &ctx.actor_id, Utc::now())
            .map_err(|error| self.reject_transition(ctx, &audit, "cancel", error))?;

        self.write(
            ctx,
            &audit,
            "store.update",
            self.ports.store.update(&next, current.version),
            deadline,
        )
        .await?;

        info!(
            event_name = "workflow.request.cancelled",
            correlation_id = %ctx.correlation_id,
            request_id = %next.id,
            actor_id = %ctx.actor_id,
            "approval request cancelled"
        );
        self.ports.audit.emit(transition_audit(&audit, "workflow.request.cancelled", &outcome));
        if let Some(pending) = current.current_approver_id.clone() {
            self.dispatch(WorkflowEvent::Cancelled { request_id: next.id.clone(), notify: pending });
        }

        Ok(next)
    }

    /// Snapshot visible to the requester and to members of the chain.
    pub async fn get(
        &self,
        ctx: &CallContext,
        request_id: &RequestId,
    ) -> Result<Request, ApplicationError> {
        let deadline = self.deadline(ctx);
        let request = self.load_existing(request_id, deadline).await?;
        if !request.is_participant(&ctx.actor_id) {
            warn!(
                event_name = "workflow.request.read_denied",
                correlation_id = %ctx.correlation_id,
                request_id = %request_id,
                actor_id = %ctx.actor_id,
                "request read by non-participant"
            );
            return Err(LifecycleError::UnauthorizedActor { actor_id: ctx.actor_id.clone() }.into());
        }
        Ok(request)
    }

    /// Requests waiting on the caller's decision, oldest first.
    pub async fn inbox(&self, ctx: &CallContext) -> Result<Vec<Request>, ApplicationError> {
        let deadline = self.deadline(ctx);
        let store = &self.ports.store;
        let actor_id = &ctx.actor_id;
        Ok(within(
            deadline,
            "store.list_awaiting",
            self.settings.retry.retry_read("store.list_awaiting", || store.list_awaiting(actor_id)),
        )
        .await??)
    }

    /// Requests the caller created, newest first.
    pub async fn list_mine(&self, ctx: &CallContext) -> Result<Vec<Request>, ApplicationError> {
        let deadline = self.deadline(ctx);
        let store = &self.ports.store;
        let actor_id = &ctx.actor_id;
        Ok(within(
            deadline,
            "store.list_by_requester",
            self.settings
                .retry
                .retry_read("store.list_by_requester", || store.list_by_requester(actor_id)),
        )
        .await??)
    }

    pub async fn list_eligible_approvers(
        &self,
        ctx: &CallContext,
        company_id: &CompanyId,
    ) -> Result<Vec<Approver>, ApplicationError> {
        let deadline = self.deadline(ctx);
        let directory = &self.ports.directory;
        Ok(within(
            deadline,
            "directory.list_eligible_approvers",
            self.settings.retry.retry_read("directory.list_eligible_approvers", || {
                directory.list_eligible_approvers(company_id)
            }),
        )
        .await??)
    }

    fn deadline(&self, ctx: &CallContext) -> Instant {
        ctx.deadline.unwrap_or_else(|| Instant::now() + self.settings.default_deadline)
    }

    async fn throttle(
        &self,
        ctx: &CallContext,
        action: &'static str,
        rule: RateLimitRule,
        deadline: Instant,
    ) -> Result<(), ApplicationError> {
        let outcome =
            within(deadline, "rate_limit", self.limiter.check_and_record(&ctx.actor_id, action, rule))
                .await?;

        match outcome {
            RateLimitOutcome::Allowed => Ok(()),
            RateLimitOutcome::Denied { retry_after_secs } => {
                warn!(
                    event_name = "workflow.guard.rate_limited",
                    correlation_id = %ctx.correlation_id,
                    actor_id = %ctx.actor_id,
                    action,
                    retry_after_secs,
                    "attempt rejected by rate limiter"
                );
                self.ports.audit.emit(
                    ctx.audit()
                        .event("workflow.guard.rate_limited", AuditCategory::Guard, AuditOutcome::Rejected)
                        .with_metadata("action", action)
                        .with_metadata("retry_after_secs", retry_after_secs.to_string()),
                );
                Err(ApplicationError::RateLimited { retry_after_secs })
            }
        }
    }

    fn reject_content(
        &self,
        ctx: &CallContext,
        operation: &'static str,
        issues: Vec<ContentIssue>,
    ) -> ApplicationError {
        let security = issues.contains(&ContentIssue::UnsafeContent);
        warn!(
            event_name = "workflow.guard.content_rejected",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor_id,
            operation,
            security,
            issues = issues.len(),
            "submitted content rejected"
        );
        self.ports.audit.emit(
            ctx.audit()
                .event("workflow.guard.content_rejected", AuditCategory::Guard, AuditOutcome::Rejected)
                .with_metadata("operation", operation)
                .with_metadata("security", security.to_string()),
        );

        if security {
            ApplicationError::SecurityRejection
        } else {
            ApplicationError::Validation(issues)
        }
    }

    fn reject_transition(
        &self,
        ctx: &CallContext,
        audit: &AuditContext,
        operation: &'static str,
        error: LifecycleError,
    ) -> ApplicationError {
        warn!(
            event_name = "workflow.request.transition_rejected",
            correlation_id = %ctx.correlation_id,
            actor_id = %ctx.actor_id,
            operation,
            error = %error,
            "lifecycle transition rejected"
        );
        self.ports.audit.emit(
            audit
                .event("workflow.request.transition_rejected", AuditCategory::Lifecycle, AuditOutcome::Rejected)
                .with_metadata("operation", operation)
                .with_metadata("error", error.to_string()),
        );
        error.into()
    }

    async fn company_directory(
        &self,
        company_id: &CompanyId,
        deadline: Instant,
    ) -> Result<Vec<Approver>, ApplicationError> {
        let directory = &self.ports.directory;
        Ok(within(
            deadline,
            "directory.list_approvers",
            self.settings
                .retry
                .retry_read("directory.list_approvers", || directory.list_approvers(company_id)),
        )
        .await??)
    }

    async fn load_existing(
        &self,
        request_id: &RequestId,
        deadline: Instant,
    ) -> Result<Request, ApplicationError> {
        let store = &self.ports.store;
        let loaded = within(
            deadline,
            "store.load",
            self.settings.retry.retry_read("store.load", || store.load(request_id)),
        )
        .await??;

        loaded.ok_or_else(|| LifecycleError::NotFound { request_id: request_id.clone() }.into())
    }

    /// Blob writes are not retried; a failed put aborts the submission.
    async fn store_files(
        &self,
        request_id: &RequestId,
        files: Vec<FileUpload>,
        deadline: Instant,
    ) -> Result<Vec<Attachment>, ApplicationError> {
        let mut attachments = Vec::with_capacity(files.len());
        for upload in files {
            let metadata = BlobMetadata {
                request_id: request_id.clone(),
                file_name: upload.file_name.trim().to_string(),
                content_type: upload.content_type.trim().to_string(),
                size_bytes: upload.content.len() as u64,
            };
            let storage_ref =
                within(deadline, "blob.put", self.ports.blobs.put_blob(&upload.content, &metadata))
                    .await?
                    .map_err(|error| {
                        warn!(
                            event_name = "workflow.blob.put_failed",
                            request_id = %request_id,
                            file_name = %metadata.file_name,
                            error = %error,
                            "attachment upload failed"
                        );
                        ApplicationError::Storage(error.to_string())
                    })?;

            attachments.push(Attachment {
                request_id: request_id.clone(),
                file_name: metadata.file_name,
                size_bytes: metadata.size_bytes,
                content_type: metadata.content_type,
                storage_ref,
            });
        }
        Ok(attachments)
    }

    /// Writes are never retried: a retried transition could apply twice.
    async fn write(
        &self,
        ctx: &CallContext,
        audit: &AuditContext,
        operation: &'static str,
        write: impl Future<Output = Result<(), StoreError>>,
        deadline: Instant,
    ) -> Result<(), ApplicationError> {
        let result = within(deadline, operation, write).await?;
        if let Err(error) = result {
            warn!(
                event_name = "workflow.store.write_failed",
                correlation_id = %ctx.correlation_id,
                actor_id = %ctx.actor_id,
                operation,
                error = %error,
                "store write failed"
            );
            let outcome = if matches!(error, StoreError::Conflict { .. }) {
                AuditOutcome::Rejected
            } else {
                AuditOutcome::Failed
            };
            self.ports.audit.emit(
                audit
                    .event("workflow.store.write_failed", AuditCategory::Persistence, outcome)
                    .with_metadata("operation", operation)
                    .with_metadata("error", error.to_string()),
            );
            return Err(error.into());
        }
        Ok(())
    }

    fn notify(&self, request: &Request, outcome: &TransitionOutcome) {
        let request_id = request.id.clone();
        let event = match (outcome.event, request.current_approver_id.clone()) {
            (LifecycleEvent::Submitted, Some(first)) => {
                WorkflowEvent::Submitted { request_id, notify: first }
            }
            (LifecycleEvent::StageApproved, Some(next)) => WorkflowEvent::AdvancedToStage {
                request_id,
                stage_index: request.stage_index,
                notify: next,
            },
            (LifecycleEvent::StageApproved, None) => {
                WorkflowEvent::Approved { request_id, notify: request.requester_id.clone() }
            }
            (LifecycleEvent::Rejected, _) => {
                WorkflowEvent::Rejected { request_id, notify: request.requester_id.clone() }
            }
            _ => return,
        };
        self.dispatch(event);
    }

    fn dispatch(&self, event: WorkflowEvent) {
        self.ports.notifier.notify(event);
    }
}

fn transition_audit(
    audit: &AuditContext,
    event_type: &str,
    outcome: &TransitionOutcome,
) -> crate::audit::AuditEvent {
    audit
        .event(event_type, AuditCategory::Lifecycle, AuditOutcome::Success)
        .with_metadata("from", outcome.from.as_str())
        .with_metadata("to", outcome.to.as_str())
        .with_metadata("event", outcome.event.as_str())
        .with_metadata("stage_before", outcome.stage_before.to_string())
        .with_metadata("stage_after", outcome.stage_after.to_string())
}

async fn within<T>(
    deadline: Instant,
    operation: &str,
    future: impl Future<Output = T>,
) -> Result<T, ApplicationError> {
    tokio::time::timeout_at(deadline, future).await.map_err(|_| {
        warn!(event_name = "workflow.deadline_exceeded", operation, "call exceeded its deadline");
        ApplicationError::DeadlineExceeded(operation.to_string())
    })
}
