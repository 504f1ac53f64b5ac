use portaflow_core::domain::approver::{ApproverRecord, CompanyId, HierarchyLevel};

use crate::connection::DbPool;
use crate::repositories::{RepositoryError, SqlApproverDirectory};

/// Deterministic approver directory for local runs and end-to-end checks:
/// two companies, a three-level hierarchy, and one non-approving member.
/// Entries go through directory ingestion in both payload shapes.
pub struct DemoDirectorySeed;

const SEED_ENTRIES: &[SeedApprover] = &[
    SeedApprover {
        company_id: "consultoria-alfa",
        id: "alfa-gerente",
        shape: SeedShape::Nested,
        name: "Marina Gerente",
        email: "marina@alfa.com.br",
        level: 1,
        role: Some("Gerente"),
        can_approve: true,
    },
    SeedApprover {
        company_id: "consultoria-alfa",
        id: "alfa-diretor",
        shape: SeedShape::Flat,
        name: "Paulo Diretor",
        email: "paulo@alfa.com.br",
        level: 2,
        role: Some("Diretor"),
        can_approve: true,
    },
    SeedApprover {
        company_id: "consultoria-alfa",
        id: "alfa-socio",
        shape: SeedShape::Nested,
        name: "Renata Sócia",
        email: "renata@alfa.com.br",
        level: 3,
        role: Some("Sócia"),
        can_approve: true,
    },
    SeedApprover {
        company_id: "consultoria-alfa",
        id: "alfa-analista",
        shape: SeedShape::Flat,
        name: "Bruno Analista",
        email: "bruno@alfa.com.br",
        level: 0,
        role: None,
        can_approve: false,
    },
    SeedApprover {
        company_id: "consultoria-beta",
        id: "beta-gerente",
        shape: SeedShape::Flat,
        name: "Clara Gerente",
        email: "clara@beta.com.br",
        level: 1,
        role: Some("Gerente"),
        can_approve: true,
    },
];

impl DemoDirectorySeed {
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlApproverDirectory::new(pool.clone());
        let mut companies: Vec<&'static str> =
            SEED_ENTRIES.iter().map(|entry| entry.company_id).collect();
        companies.dedup();

        for company in &companies {
            let records = SEED_ENTRIES
                .iter()
                .filter(|entry| entry.company_id == *company)
                .map(SeedApprover::record)
                .collect();
            directory.ingest(&CompanyId(company.to_string()), records).await?;
        }

        Ok(SeedResult { approvers_seeded: SEED_ENTRIES.len(), companies })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();
        for entry in SEED_ENTRIES {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM approver_directory
                               WHERE company_id = ?1 AND id = ?2 AND level = ?3 AND can_approve = ?4)",
            )
            .bind(entry.company_id)
            .bind(entry.id)
            .bind(entry.level)
            .bind(entry.can_approve)
            .fetch_one(pool)
            .await?;
            checks.push((entry.id, present == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;
        for entry in SEED_ENTRIES {
            sqlx::query("DELETE FROM approver_directory WHERE company_id = ? AND id = ?")
                .bind(entry.company_id)
                .bind(entry.id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
enum SeedShape {
    Nested,
    Flat,
}

#[derive(Debug, Clone, Copy)]
struct SeedApprover {
    company_id: &'static str,
    id: &'static str,
    shape: SeedShape,
    name: &'static str,
    email: &'static str,
    level: i32,
    role: Option<&'static str>,
    can_approve: bool,
}

impl SeedApprover {
    fn record(&self) -> ApproverRecord {
        let role = self.role.unwrap_or_default().to_string();
        match self.shape {
            SeedShape::Nested => ApproverRecord::Nested {
                id: self.id.to_string(),
                name: self.name.to_string(),
                email: self.email.to_string(),
                hierarchy_level: HierarchyLevel {
                    level: self.level,
                    name: role,
                    can_approve: self.can_approve,
                },
            },
            SeedShape::Flat => ApproverRecord::Flat {
                id: self.id.to_string(),
                name: self.name.to_string(),
                email: self.email.to_string(),
                cargo: role,
                nivel: self.level,
                can_approve: self.can_approve,
            },
        }
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub approvers_seeded: usize,
    pub companies: Vec<&'static str>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use portaflow_core::domain::approver::CompanyId;
    use portaflow_core::ports::ApproverDirectory;

    use super::DemoDirectorySeed;
    use crate::repositories::SqlApproverDirectory;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn seed_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let first = DemoDirectorySeed::load(&pool).await.expect("seed");
        DemoDirectorySeed::load(&pool).await.expect("reseed");
        assert_eq!(first.approvers_seeded, 5);
        assert_eq!(first.companies, vec!["consultoria-alfa", "consultoria-beta"]);

        let verification = DemoDirectorySeed::verify(&pool).await.expect("verify");
        assert!(verification.all_present, "{:?}", verification.checks);

        let eligible = SqlApproverDirectory::new(pool.clone())
            .list_eligible_approvers(&CompanyId("consultoria-alfa".to_owned()))
            .await
            .expect("eligible");
        assert_eq!(eligible.len(), 3);
        let roles: Vec<Option<&str>> = eligible.iter().map(|a| a.role.as_deref()).collect();
        assert_eq!(roles, vec![Some("Gerente"), Some("Diretor"), Some("Sócia")]);

        let alfa = SqlApproverDirectory::new(pool.clone())
            .list_approvers(&CompanyId("consultoria-alfa".to_owned()))
            .await
            .expect("directory");
        let analyst = alfa.iter().find(|a| a.id.as_str() == "alfa-analista").expect("analyst");
        assert_eq!(analyst.role, None);
        assert!(!analyst.can_approve);

        DemoDirectorySeed::clean(&pool).await.expect("clean");
        assert!(!DemoDirectorySeed::verify(&pool).await.expect("verify").all_present);
    }
}
