use std::collections::HashSet;

use thiserror::Error;

use crate::domain::approver::{Approver, ApproverChain, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("approver chain is empty")]
    Empty,
    #[error("approver `{approver_id}` is not allowed to approve")]
    IneligibleApprover { approver_id: UserId },
    #[error("approver `{approver_id}` selected more than once")]
    DuplicateApprover { approver_id: UserId },
    #[error("approver `{approver_id}` is not in the company directory")]
    UnknownApprover { approver_id: UserId },
}

impl ChainError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Empty => "Selecione ao menos um aprovador.".to_string(),
            Self::IneligibleApprover { approver_id } => {
                format!("O usuário {approver_id} não tem permissão para aprovar solicitações.")
            }
            Self::DuplicateApprover { approver_id } => {
                format!("O aprovador {approver_id} foi selecionado mais de uma vez.")
            }
            Self::UnknownApprover { approver_id } => {
                format!("O aprovador {approver_id} não pertence a esta empresa.")
            }
        }
    }
}

/// Turns a selection of directory entries into the ordered chain a request
/// walks through. Lowest hierarchy level acts first; entries on the same
/// level keep their selection order.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApproverChainBuilder;

impl ApproverChainBuilder {
    /// Looks up selected ids in the company directory, preserving selection
    /// order. Duplicates are left in place for [`Self::build`] to report.
    pub fn resolve(
        &self,
        directory: &[Approver],
        selected_ids: &[UserId],
    ) -> Result<Vec<Approver>, ChainError> {
        if selected_ids.is_empty() {
            return Err(ChainError::Empty);
        }

        selected_ids
            .iter()
            .map(|selected| {
                let wanted = selected.as_str().trim();
                directory
                    .iter()
                    .find(|approver| !wanted.is_empty() && approver.id.as_str() == wanted)
                    .cloned()
                    .ok_or_else(|| ChainError::UnknownApprover {
                        approver_id: UserId(wanted.to_string()),
                    })
            })
            .collect()
    }

    pub fn build(&self, selected: &[Approver]) -> Result<ApproverChain, ChainError> {
        if selected.is_empty() {
            return Err(ChainError::Empty);
        }

        let mut seen = HashSet::with_capacity(selected.len());
        for approver in selected {
            if !seen.insert(&approver.id) {
                return Err(ChainError::DuplicateApprover { approver_id: approver.id.clone() });
            }
            if !approver.can_approve {
                return Err(ChainError::IneligibleApprover { approver_id: approver.id.clone() });
            }
        }

        let mut ordered: Vec<&Approver> = selected.iter().collect();
        // stable: ties keep selection order
        ordered.sort_by_key(|approver| approver.level);

        Ok(ApproverChain::new(ordered.into_iter().map(|approver| approver.id.clone()).collect()))
    }
}
