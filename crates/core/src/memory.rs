use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use crate::domain::approver::{Approver, CompanyId, UserId};
use crate::domain::attachment::{BlobMetadata, StorageRef};
use crate::domain::request::{Request, RequestId, RequestStatus};
use crate::ports::{
    ApproverDirectory, AttemptDecision, AttemptLog, BlobStore, Notifier, RequestStore, StoreError,
    WorkflowEvent,
};

#[derive(Default)]
pub struct InMemoryRequestStore {
    requests: RwLock<HashMap<String, Request>>,
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn load(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn insert(&self, request: &Request) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id.0) {
            return Err(StoreError::Duplicate(request.id.0.clone()));
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn update(&self, request: &Request, expected_version: u64) -> Result<(), StoreError> {
        let mut requests = self.requests.write().await;
        let found = requests.get(&request.id.0).map(|stored| stored.version);
        if found != Some(expected_version) {
            return Err(StoreError::Conflict {
                request_id: request.id.0.clone(),
                expected: expected_version,
                found,
            });
        }
        requests.insert(request.id.0.clone(), request.clone());
        Ok(())
    }

    async fn list_awaiting(&self, approver_id: &UserId) -> Result<Vec<Request>, StoreError> {
        let requests = self.requests.read().await;
        let mut awaiting: Vec<Request> = requests
            .values()
            .filter(|request| {
                request.status == RequestStatus::InReview
                    && request.current_approver_id.as_ref() == Some(approver_id)
            })
            .cloned()
            .collect();
        awaiting.sort_by(|left, right| left.created_at.cmp(&right.created_at));
        Ok(awaiting)
    }

    async fn list_by_requester(&self, requester_id: &UserId) -> Result<Vec<Request>, StoreError> {
        let requests = self.requests.read().await;
        let mut mine: Vec<Request> = requests
            .values()
            .filter(|request| &request.requester_id == requester_id)
            .cloned()
            .collect();
        mine.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        Ok(mine)
    }
}

#[derive(Default)]
pub struct InMemoryApproverDirectory {
    entries: RwLock<HashMap<CompanyId, Vec<Approver>>>,
}

impl InMemoryApproverDirectory {
    pub fn with_entries(entries: Vec<(CompanyId, Approver)>) -> Self {
        let mut by_company: HashMap<CompanyId, Vec<Approver>> = HashMap::new();
        for (company_id, approver) in entries {
            by_company.entry(company_id).or_default().push(approver);
        }
        Self { entries: RwLock::new(by_company) }
    }
}

#[async_trait]
impl ApproverDirectory for InMemoryApproverDirectory {
    async fn list_approvers(&self, company_id: &CompanyId) -> Result<Vec<Approver>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.get(company_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub async fn get(&self, storage_ref: &StorageRef) -> Option<Vec<u8>> {
        self.blobs.read().await.get(&storage_ref.0).cloned()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put_blob(
        &self,
        bytes: &[u8],
        metadata: &BlobMetadata,
    ) -> Result<StorageRef, StoreError> {
        let mut blobs = self.blobs.write().await;
        let storage_ref =
            StorageRef(format!("memory/{}/{}/{}", metadata.request_id, blobs.len(), metadata.file_name));
        blobs.insert(storage_ref.0.clone(), bytes.to_vec());
        Ok(storage_ref)
    }
}

#[derive(Default)]
pub struct InMemoryNotifier {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl InMemoryNotifier {
    pub fn events(&self) -> Vec<WorkflowEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, event: WorkflowEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Attempt log guarded by a single mutex, which makes check-and-record atomic.
#[derive(Default)]
pub struct InMemoryAttemptLog {
    attempts: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl InMemoryAttemptLog {
    pub fn tracked_keys(&self) -> usize {
        let attempts = match self.attempts.lock() {
            Ok(attempts) => attempts,
            Err(poisoned) => poisoned.into_inner(),
        };
        attempts.len()
    }

    pub fn recorded(&self, key: &str) -> usize {
        let attempts = match self.attempts.lock() {
            Ok(attempts) => attempts,
            Err(poisoned) => poisoned.into_inner(),
        };
        attempts.get(key).map(VecDeque::len).unwrap_or(0)
    }
}

#[async_trait]
impl AttemptLog for InMemoryAttemptLog {
    async fn check_and_record(
        &self,
        key: &str,
        max_attempts: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<AttemptDecision, StoreError> {
        let mut attempts = self
            .attempts
            .lock()
            .map_err(|_| StoreError::Unavailable("attempt log lock poisoned".to_string()))?;
        // Timestamps can land slightly out of order, so expiry scans every entry.
        let cutoff = now - window;
        attempts.retain(|_, entries| {
            entries.retain(|attempt| *attempt > cutoff);
            !entries.is_empty()
        });

        let in_window = attempts.get(key).map(VecDeque::len).unwrap_or(0);
        let oldest = attempts.get(key).and_then(|entries| entries.iter().min().copied());
        if in_window >= max_attempts as usize {
            return Ok(AttemptDecision { allowed: false, oldest_in_window: oldest });
        }

        attempts.entry(key.to_string()).or_default().push_back(now);
        let oldest_in_window = Some(oldest.map_or(now, |oldest| oldest.min(now)));
        Ok(AttemptDecision { allowed: true, oldest_in_window })
    }
}
