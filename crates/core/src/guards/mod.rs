pub mod attachments;
pub mod content;
pub mod rate_limit;

pub use attachments::{AttachmentGuard, AttachmentPolicy, BatchVerdict, FileRejection, RejectionReason};
pub use content::{ContentIssue, ContentValidator, Field, ValidationOutcome};
pub use rate_limit::{RateLimitOutcome, RateLimitRule, RateLimiter, DECIDE_ACTION, SUBMIT_ACTION};
