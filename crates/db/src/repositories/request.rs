use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use portaflow_core::domain::approver::{ApproverChain, CompanyId, UserId};
use portaflow_core::domain::attachment::Attachment;
use portaflow_core::domain::request::{
    DecisionRecord, Priority, Request, RequestContent, RequestId, RequestStatus,
};
use portaflow_core::ports::{RequestStore, StoreError};

use super::{decode_error, RepositoryError};
use crate::DbPool;

const SELECT_REQUEST: &str = "SELECT id, requester_id, company_id, title, description, period,
        request_type, priority, justification, requested_amount, status, stage_index,
        current_approver_id, approver_chain_json, completed_approvers_json, decisions_json,
        attachments_json, version, created_at, updated_at
 FROM approval_request";

pub struct SqlRequestStore {
    pool: DbPool,
}

impl SqlRequestStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: &RequestId) -> Result<Option<Request>, RepositoryError> {
        let sql = format!("{SELECT_REQUEST} WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn insert_row(&self, request: &Request) -> Result<(), RepositoryError> {
        let encoded = EncodedRequest::from_request(request)?;

        sqlx::query(
            "INSERT INTO approval_request (id, requester_id, company_id, title, description,
                                           period, request_type, priority, justification,
                                           requested_amount, status, stage_index,
                                           current_approver_id, approver_chain_json,
                                           completed_approvers_json, decisions_json,
                                           attachments_json, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.requester_id.0)
        .bind(&request.company_id.0)
        .bind(&request.content.title)
        .bind(&request.content.description)
        .bind(&request.content.period)
        .bind(&request.content.request_type)
        .bind(request.content.priority.as_str())
        .bind(&request.content.justification)
        .bind(request.content.requested_amount.map(|amount| amount.to_string()))
        .bind(request.status.as_str())
        .bind(i64::from(request.stage_index))
        .bind(request.current_approver_id.as_ref().map(|id| id.0.clone()))
        .bind(&encoded.chain)
        .bind(&encoded.completed)
        .bind(&encoded.decisions)
        .bind(&encoded.attachments)
        .bind(encoded.version)
        .bind(timestamp(&request.created_at))
        .bind(timestamp(&request.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Compare-and-set on `version`. Returns the version actually stored when
    /// the swap did not apply.
    async fn update_row(
        &self,
        request: &Request,
        expected_version: u64,
    ) -> Result<Option<Option<u64>>, RepositoryError> {
        let encoded = EncodedRequest::from_request(request)?;
        let expected = i64::try_from(expected_version).map_err(decode_error)?;

        let result = sqlx::query(
            "UPDATE approval_request
             SET status = ?, stage_index = ?, current_approver_id = ?,
                 completed_approvers_json = ?, decisions_json = ?, attachments_json = ?,
                 version = ?, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(request.status.as_str())
        .bind(i64::from(request.stage_index))
        .bind(request.current_approver_id.as_ref().map(|id| id.0.clone()))
        .bind(&encoded.completed)
        .bind(&encoded.decisions)
        .bind(&encoded.attachments)
        .bind(encoded.version)
        .bind(timestamp(&request.updated_at))
        .bind(&request.id.0)
        .bind(expected)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(None);
        }

        let found: Option<i64> =
            sqlx::query_scalar("SELECT version FROM approval_request WHERE id = ?")
                .bind(&request.id.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(Some(found.and_then(|version| u64::try_from(version).ok())))
    }

    async fn fetch_where(
        &self,
        filter: &str,
        bind: &str,
    ) -> Result<Vec<Request>, RepositoryError> {
        let sql = format!("{SELECT_REQUEST} {filter}");
        let rows: Vec<sqlx::sqlite::SqliteRow> =
            sqlx::query(&sql).bind(bind).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }
}

#[async_trait]
impl RequestStore for SqlRequestStore {
    async fn load(&self, id: &RequestId) -> Result<Option<Request>, StoreError> {
        Ok(self.fetch(id).await?)
    }

    async fn insert(&self, request: &Request) -> Result<(), StoreError> {
        match self.insert_row(request).await {
            Ok(()) => Ok(()),
            Err(RepositoryError::Database(sqlx::Error::Database(db))) if db.is_unique_violation() => {
                Err(StoreError::Duplicate(request.id.0.clone()))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn update(&self, request: &Request, expected_version: u64) -> Result<(), StoreError> {
        match self.update_row(request, expected_version).await? {
            None => Ok(()),
            Some(found) => Err(StoreError::Conflict {
                request_id: request.id.0.clone(),
                expected: expected_version,
                found,
            }),
        }
    }

    async fn list_awaiting(&self, approver_id: &UserId) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .fetch_where(
                "WHERE status = 'in_review' AND current_approver_id = ?
                 ORDER BY created_at ASC, id ASC",
                &approver_id.0,
            )
            .await?)
    }

    async fn list_by_requester(&self, requester_id: &UserId) -> Result<Vec<Request>, StoreError> {
        Ok(self
            .fetch_where(
                "WHERE requester_id = ? ORDER BY created_at DESC, id DESC",
                &requester_id.0,
            )
            .await?)
    }
}

struct EncodedRequest {
    chain: String,
    completed: String,
    decisions: String,
    attachments: String,
    version: i64,
}

impl EncodedRequest {
    fn from_request(request: &Request) -> Result<Self, RepositoryError> {
        Ok(Self {
            chain: serde_json::to_string(&request.approver_chain).map_err(decode_error)?,
            completed: serde_json::to_string(&request.completed_approvers)
                .map_err(decode_error)?,
            decisions: serde_json::to_string(&request.decisions).map_err(decode_error)?,
            attachments: serde_json::to_string(&request.attachments).map_err(decode_error)?,
            version: i64::try_from(request.version).map_err(decode_error)?,
        })
    }
}

/// Fixed-width so lexical order in SQL matches chronological order.
fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<Request, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let requester_id: String = row.try_get("requester_id").map_err(decode_error)?;
    let company_id: String = row.try_get("company_id").map_err(decode_error)?;
    let title: String = row.try_get("title").map_err(decode_error)?;
    let description: String = row.try_get("description").map_err(decode_error)?;
    let period: String = row.try_get("period").map_err(decode_error)?;
    let request_type: String = row.try_get("request_type").map_err(decode_error)?;
    let priority_str: String = row.try_get("priority").map_err(decode_error)?;
    let justification: Option<String> = row.try_get("justification").map_err(decode_error)?;
    let amount_str: Option<String> = row.try_get("requested_amount").map_err(decode_error)?;
    let status_str: String = row.try_get("status").map_err(decode_error)?;
    let stage_index: i64 = row.try_get("stage_index").map_err(decode_error)?;
    let current_approver_id: Option<String> =
        row.try_get("current_approver_id").map_err(decode_error)?;
    let chain_json: String = row.try_get("approver_chain_json").map_err(decode_error)?;
    let completed_json: String = row.try_get("completed_approvers_json").map_err(decode_error)?;
    let decisions_json: String = row.try_get("decisions_json").map_err(decode_error)?;
    let attachments_json: String = row.try_get("attachments_json").map_err(decode_error)?;
    let version: i64 = row.try_get("version").map_err(decode_error)?;
    let created_at_str: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at_str: String = row.try_get("updated_at").map_err(decode_error)?;

    let priority = Priority::parse(&priority_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown priority `{priority_str}`")))?;
    let status = RequestStatus::parse(&status_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_str}`")))?;
    let requested_amount = amount_str
        .map(|raw| Decimal::from_str(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("requested_amount: {e}")))?;
    let chain: Vec<UserId> = serde_json::from_str(&chain_json).map_err(decode_error)?;
    let completed_approvers: Vec<UserId> =
        serde_json::from_str(&completed_json).map_err(decode_error)?;
    let decisions: Vec<DecisionRecord> =
        serde_json::from_str(&decisions_json).map_err(decode_error)?;
    let attachments: Vec<Attachment> =
        serde_json::from_str(&attachments_json).map_err(decode_error)?;

    let request = Request {
        id: RequestId(id),
        requester_id: UserId(requester_id),
        company_id: CompanyId(company_id),
        content: RequestContent {
            title,
            description,
            period,
            request_type,
            priority,
            justification,
            requested_amount,
        },
        status,
        stage_index: u32::try_from(stage_index).map_err(decode_error)?,
        current_approver_id: current_approver_id.map(UserId),
        approver_chain: ApproverChain::from_persisted(chain),
        completed_approvers,
        decisions,
        attachments,
        version: u64::try_from(version).map_err(decode_error)?,
        created_at: parse_timestamp("created_at", &created_at_str)?,
        updated_at: parse_timestamp("updated_at", &updated_at_str)?,
    };

    if let Some(violation) = request.invariant_violation() {
        return Err(RepositoryError::Decode(format!("request `{}`: {violation}", request.id)));
    }
    Ok(request)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use portaflow_core::domain::approver::{ApproverChain, CompanyId, UserId};
    use portaflow_core::domain::request::{
        Priority, Request, RequestContent, RequestId, RequestStatus,
    };
    use portaflow_core::ports::{RequestStore, StoreError};

    use super::SqlRequestStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn user(id: &str) -> UserId {
        UserId(id.to_owned())
    }

    fn in_review(id: &str, minutes_ago: i64) -> Request {
        let created_at = Utc::now() - Duration::minutes(minutes_ago);
        Request {
            id: RequestId(id.to_owned()),
            requester_id: user("solicitante"),
            company_id: CompanyId("acme".to_owned()),
            content: RequestContent {
                title: "Compra de Equipamento".to_owned(),
                description: "Notebooks".to_owned(),
                period: "Janeiro/2024".to_owned(),
                request_type: "compra".to_owned(),
                priority: Priority::High,
                justification: None,
                requested_amount: Some(Decimal::new(1_500_000, 2)),
            },
            status: RequestStatus::InReview,
            stage_index: 1,
            current_approver_id: Some(user("L1")),
            approver_chain: ApproverChain::from_persisted(vec![user("L1"), user("L2")]),
            completed_approvers: Vec::new(),
            decisions: Vec::new(),
            attachments: Vec::new(),
            version: 1,
            created_at,
            updated_at: created_at,
        }
    }

    fn advanced(request: &Request) -> Request {
        let mut next = request.clone();
        next.stage_index = 2;
        next.completed_approvers = vec![user("L1")];
        next.current_approver_id = Some(user("L2"));
        next.version = request.version + 1;
        next.updated_at = Utc::now();
        next
    }

    #[tokio::test]
    async fn insert_then_load_round_trips_the_snapshot() {
        let store = SqlRequestStore::new(pool().await);
        let request = in_review("REQ-1", 0);

        store.insert(&request).await.expect("insert");
        let loaded = store.load(&request.id).await.expect("load").expect("present");

        assert_eq!(loaded, request);
        assert!(store.load(&RequestId("REQ-missing".to_owned())).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn duplicate_insert_is_reported() {
        let store = SqlRequestStore::new(pool().await);
        let request = in_review("REQ-1", 0);

        store.insert(&request).await.expect("insert");
        let error = store.insert(&request).await.expect_err("duplicate");

        assert_eq!(error, StoreError::Duplicate("REQ-1".to_owned()));
    }

    #[tokio::test]
    async fn update_applies_only_on_matching_version() {
        let store = SqlRequestStore::new(pool().await);
        let request = in_review("REQ-1", 0);
        store.insert(&request).await.expect("insert");

        let next = advanced(&request);
        store.update(&next, 1).await.expect("first swap");

        let error = store.update(&next, 1).await.expect_err("stale swap");
        assert_eq!(
            error,
            StoreError::Conflict { request_id: "REQ-1".to_owned(), expected: 1, found: Some(2) }
        );

        let loaded = store.load(&request.id).await.expect("load").expect("present");
        assert_eq!(loaded.stage_index, 2);
        assert_eq!(loaded.version, 2);
    }

    #[tokio::test]
    async fn inbox_is_oldest_first_and_mine_is_newest_first() {
        let store = SqlRequestStore::new(pool().await);
        let older = in_review("REQ-old", 30);
        let newer = in_review("REQ-new", 5);
        store.insert(&newer).await.expect("insert newer");
        store.insert(&older).await.expect("insert older");

        let inbox = store.list_awaiting(&user("L1")).await.expect("inbox");
        let ids: Vec<&str> = inbox.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-old", "REQ-new"]);
        assert!(store.list_awaiting(&user("L2")).await.expect("inbox").is_empty());

        let mine = store.list_by_requester(&user("solicitante")).await.expect("mine");
        let ids: Vec<&str> = mine.iter().map(|r| r.id.0.as_str()).collect();
        assert_eq!(ids, vec!["REQ-new", "REQ-old"]);
    }

    #[tokio::test]
    async fn rows_breaking_stage_bookkeeping_are_reported_corrupt() {
        let pool = pool().await;
        let store = SqlRequestStore::new(pool.clone());
        let request = in_review("REQ-1", 0);
        store.insert(&request).await.expect("insert");

        sqlx::query("UPDATE approval_request SET stage_index = 2 WHERE id = 'REQ-1'")
            .execute(&pool)
            .await
            .expect("tamper");

        let error = store.load(&request.id).await.expect_err("corrupt");
        assert!(matches!(error, StoreError::Corrupt(_)));
    }
}
