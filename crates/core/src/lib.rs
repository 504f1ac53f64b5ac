pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod guards;
pub mod memory;
pub mod ports;
pub mod retry;
pub mod workflow;

pub use approvals::{ApproverChainBuilder, ChainError};
pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::approver::{Approver, ApproverChain, ApproverRecord, CompanyId, UserId};
pub use domain::attachment::{Attachment, BlobMetadata, FileCandidate, FileUpload, StorageRef};
pub use domain::request::{
    DecisionRecord, Priority, Request, RequestContent, RequestId, RequestStatus,
    SubmissionFields, Verdict,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{LifecycleError, LifecycleEvent, RequestLifecycle, TransitionOutcome};
pub use guards::{AttachmentGuard, AttachmentPolicy, ContentValidator, RateLimiter};
pub use ports::{
    ApproverDirectory, AttemptLog, BlobStore, Notifier, RequestStore, StoreError, WorkflowEvent,
};
pub use retry::RetryPolicy;
pub use workflow::{
    CallContext, DecideCommand, SubmitCommand, WorkflowPorts, WorkflowService, WorkflowSettings,
};
