use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::approver::UserId;
use crate::ports::AttemptLog;

pub const SUBMIT_ACTION: &str = "request.submit";
pub const DECIDE_ACTION: &str = "request.decide";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub max_attempts: u32,
    pub window_minutes: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitOutcome {
    Allowed,
    Denied { retry_after_secs: u64 },
}

impl RateLimitOutcome {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Sliding-window throttle keyed by `(actor, action)`.
///
/// Fails closed: when the attempt log cannot be reached the attempt is denied.
#[derive(Clone)]
pub struct RateLimiter {
    log: Arc<dyn AttemptLog>,
}

impl RateLimiter {
    pub fn new(log: Arc<dyn AttemptLog>) -> Self {
        Self { log }
    }

    pub async fn check_and_record(
        &self,
        actor_id: &UserId,
        action: &str,
        rule: RateLimitRule,
    ) -> RateLimitOutcome {
        self.check_and_record_at(actor_id, action, rule, Utc::now()).await
    }

    pub async fn check_and_record_at(
        &self,
        actor_id: &UserId,
        action: &str,
        rule: RateLimitRule,
        now: DateTime<Utc>,
    ) -> RateLimitOutcome {
        let key = attempt_key(actor_id, action);
        let window = Duration::minutes(i64::from(rule.window_minutes));

        match self.log.check_and_record(&key, rule.max_attempts, window, now).await {
            Ok(decision) if decision.allowed => RateLimitOutcome::Allowed,
            Ok(decision) => {
                let retry_after = decision
                    .oldest_in_window
                    .map(|oldest| oldest + window - now)
                    .unwrap_or(window);
                RateLimitOutcome::Denied { retry_after_secs: ceil_secs(retry_after) }
            }
            Err(error) => {
                warn!(
                    event_name = "workflow.guard.rate_limit_store_unavailable",
                    actor_id = %actor_id,
                    action,
                    error = %error,
                    "attempt log unavailable; denying"
                );
                RateLimitOutcome::Denied { retry_after_secs: ceil_secs(window) }
            }
        }
    }
}

fn attempt_key(actor_id: &UserId, action: &str) -> String {
    format!("{}|{}", actor_id.as_str(), action)
}

fn ceil_secs(duration: Duration) -> u64 {
    let millis = duration.num_milliseconds().max(0) as u64;
    millis.div_ceil(1000).max(1)
}
