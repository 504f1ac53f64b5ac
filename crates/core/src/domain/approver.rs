use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant boundary for every directory lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompanyId(pub String);

impl std::fmt::Display for CompanyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical directory entry. Both ingestion shapes normalize into this.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approver {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub level: i32,
    pub role: Option<String>,
    pub can_approve: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyLevel {
    pub level: i32,
    pub name: String,
    #[serde(default)]
    pub can_approve: bool,
}

/// Raw directory payloads as the selectors deliver them.
///
/// The nested variant carries the hierarchy object; the flat variant carries
/// `cargo`/`nivel` and may omit `canApprove`, in which case the entry is not
/// eligible.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApproverRecord {
    #[serde(rename_all = "camelCase")]
    Nested { id: String, name: String, email: String, hierarchy_level: HierarchyLevel },
    #[serde(rename_all = "camelCase")]
    Flat {
        id: String,
        name: String,
        email: String,
        cargo: String,
        nivel: i32,
        #[serde(default)]
        can_approve: bool,
    },
}

impl ApproverRecord {
    pub fn normalize(self) -> Approver {
        match self {
            Self::Nested { id, name, email, hierarchy_level } => Approver {
                id: UserId(id.trim().to_string()),
                name: name.trim().to_string(),
                email: email.trim().to_ascii_lowercase(),
                level: hierarchy_level.level,
                role: non_blank(hierarchy_level.name),
                can_approve: hierarchy_level.can_approve,
            },
            Self::Flat { id, name, email, cargo, nivel, can_approve } => Approver {
                id: UserId(id.trim().to_string()),
                name: name.trim().to_string(),
                email: email.trim().to_ascii_lowercase(),
                level: nivel,
                role: non_blank(cargo),
                can_approve,
            },
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Ordered approver ids fixed at submission time.
///
/// Only [`crate::approvals::ApproverChainBuilder`] produces chains for new
/// requests; [`ApproverChain::from_persisted`] exists for storage adapters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApproverChain(Vec<UserId>);

impl ApproverChain {
    pub(crate) fn new(ids: Vec<UserId>) -> Self {
        Self(ids)
    }

    pub fn from_persisted(ids: Vec<UserId>) -> Self {
        Self(ids)
    }

    pub fn as_slice(&self) -> &[UserId] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Approver for a 1-based stage.
    pub fn at_stage(&self, stage_index: u32) -> Option<&UserId> {
        let position = usize::try_from(stage_index).ok()?.checked_sub(1)?;
        self.0.get(position)
    }

    pub fn contains(&self, id: &UserId) -> bool {
        self.0.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApproverChain, ApproverRecord, UserId};

    #[test]
    fn nested_shape_normalizes_hierarchy_fields() {
        let record: ApproverRecord = serde_json::from_str(
            r#"{
                "id": " u-10 ",
                "name": "Marina Costa",
                "email": "Marina@Consultoria.com.br",
                "hierarchyLevel": { "level": 2, "name": "Gerente", "canApprove": true }
            }"#,
        )
        .expect("nested record");

        let approver = record.normalize();
        assert_eq!(approver.id, UserId("u-10".to_string()));
        assert_eq!(approver.email, "marina@consultoria.com.br");
        assert_eq!(approver.level, 2);
        assert_eq!(approver.role.as_deref(), Some("Gerente"));
        assert!(approver.can_approve);
    }

    #[test]
    fn flat_shape_without_flag_is_not_eligible() {
        let record: ApproverRecord = serde_json::from_str(
            r#"{ "id": "u-11", "name": "Paulo", "email": "paulo@x.com", "cargo": "Diretor", "nivel": 3 }"#,
        )
        .expect("flat record");

        let approver = record.normalize();
        assert_eq!(approver.level, 3);
        assert_eq!(approver.role.as_deref(), Some("Diretor"));
        assert!(!approver.can_approve);
    }

    #[test]
    fn chain_stage_lookup_is_one_based() {
        let chain = ApproverChain::from_persisted(vec![
            UserId("a".to_string()),
            UserId("b".to_string()),
        ]);

        assert_eq!(chain.at_stage(0), None);
        assert_eq!(chain.at_stage(1), Some(&UserId("a".to_string())));
        assert_eq!(chain.at_stage(2), Some(&UserId("b".to_string())));
        assert_eq!(chain.at_stage(3), None);
    }
}
