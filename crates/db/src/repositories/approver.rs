use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use sqlx::Row;

use portaflow_core::domain::approver::{Approver, ApproverRecord, CompanyId, UserId};
use portaflow_core::ports::{ApproverDirectory, StoreError};

use super::{decode_error, RepositoryError};
use crate::DbPool;

/// Company-scoped approver directory backed by `approver_directory`.
pub struct SqlApproverDirectory {
    pool: DbPool,
}

impl SqlApproverDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn upsert(
        &self,
        company_id: &CompanyId,
        approver: &Approver,
    ) -> Result<(), RepositoryError> {
        upsert_statement(company_id, approver).execute(&self.pool).await?;
        Ok(())
    }

    /// Normalizes raw directory records of either shape and stores them in
    /// one transaction. Returns the number of entries written.
    pub async fn ingest(
        &self,
        company_id: &CompanyId,
        records: Vec<ApproverRecord>,
    ) -> Result<usize, RepositoryError> {
        let approvers: Vec<Approver> = records.into_iter().map(ApproverRecord::normalize).collect();

        let mut tx = self.pool.begin().await?;
        for approver in &approvers {
            upsert_statement(company_id, approver).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(approvers.len())
    }

    async fn fetch_company(&self, company_id: &CompanyId) -> Result<Vec<Approver>, RepositoryError> {
        let rows: Vec<sqlx::sqlite::SqliteRow> = sqlx::query(
            "SELECT id, name, email, level, role, can_approve
             FROM approver_directory
             WHERE company_id = ?
             ORDER BY level ASC, name ASC",
        )
        .bind(&company_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approver).collect::<Result<Vec<_>, _>>()
    }
}

fn upsert_statement<'q>(
    company_id: &'q CompanyId,
    approver: &'q Approver,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    sqlx::query(
        "INSERT INTO approver_directory (company_id, id, name, email, level, role, can_approve)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(company_id, id) DO UPDATE SET
             name = excluded.name,
             email = excluded.email,
             level = excluded.level,
             role = excluded.role,
             can_approve = excluded.can_approve",
    )
    .bind(&company_id.0)
    .bind(&approver.id.0)
    .bind(&approver.name)
    .bind(&approver.email)
    .bind(approver.level)
    .bind(&approver.role)
    .bind(approver.can_approve)
}

fn row_to_approver(row: &sqlx::sqlite::SqliteRow) -> Result<Approver, RepositoryError> {
    Ok(Approver {
        id: UserId(row.try_get("id").map_err(decode_error)?),
        name: row.try_get("name").map_err(decode_error)?,
        email: row.try_get("email").map_err(decode_error)?,
        level: row.try_get("level").map_err(decode_error)?,
        role: row.try_get("role").map_err(decode_error)?,
        can_approve: row.try_get("can_approve").map_err(decode_error)?,
    })
}

#[async_trait]
impl ApproverDirectory for SqlApproverDirectory {
    async fn list_approvers(&self, company_id: &CompanyId) -> Result<Vec<Approver>, StoreError> {
        Ok(self.fetch_company(company_id).await?)
    }
}
