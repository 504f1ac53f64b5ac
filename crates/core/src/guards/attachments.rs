use serde::{Deserialize, Serialize};

use crate::domain::attachment::FileCandidate;

pub const MAX_FILE_NAME_CHARS: usize = 255;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentPolicy {
    pub max_files: usize,
    pub max_size_bytes: u64,
    pub allowed_types: Vec<String>,
}

impl Default for AttachmentPolicy {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_size_bytes: 50 * 1024 * 1024,
            allowed_types: default_allowed_types(),
        }
    }
}

pub fn default_allowed_types() -> Vec<String> {
    [
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "image/png",
        "image/jpeg",
        "text/plain",
        "text/csv",
    ]
    .iter()
    .map(|content_type| content_type.to_string())
    .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectionReason {
    Capacity { max_files: usize, remaining: usize },
    TooLarge { max_size_bytes: u64 },
    TypeNotAllowed { content_type: String },
    Empty,
    InvalidName,
}

impl RejectionReason {
    pub fn message(&self) -> String {
        match self {
            Self::Capacity { max_files, remaining } => format!(
                "limite de {max_files} arquivos excedido; restam {remaining} envios para esta solicitação"
            ),
            Self::TooLarge { max_size_bytes } => {
                format!("arquivo excede o tamanho máximo de {} MB", max_size_bytes / (1024 * 1024))
            }
            Self::TypeNotAllowed { content_type } => {
                format!("tipo de arquivo não permitido: {content_type}")
            }
            Self::Empty => "arquivo vazio".to_string(),
            Self::InvalidName => "nome de arquivo inválido".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRejection {
    pub file: FileCandidate,
    pub reason: RejectionReason,
}

/// Every incoming file lands in exactly one of the two lists, in input order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchVerdict {
    pub accepted: Vec<FileCandidate>,
    pub rejected: Vec<FileRejection>,
}

impl BatchVerdict {
    pub fn all_accepted(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct AttachmentGuard {
    policy: AttachmentPolicy,
}

impl AttachmentGuard {
    pub fn new(policy: AttachmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &AttachmentPolicy {
        &self.policy
    }

    /// `existing_accepted` counts files already attached to the request.
    pub fn accept(&self, existing_accepted: usize, files: &[FileCandidate]) -> BatchVerdict {
        let remaining = self.policy.max_files.saturating_sub(existing_accepted);

        if files.len() > remaining {
            let reason = RejectionReason::Capacity { max_files: self.policy.max_files, remaining };
            return BatchVerdict {
                accepted: Vec::new(),
                rejected: files
                    .iter()
                    .map(|file| FileRejection { file: file.clone(), reason: reason.clone() })
                    .collect(),
            };
        }

        let mut verdict = BatchVerdict::default();
        for file in files {
            match self.check_file(file) {
                Some(reason) => {
                    verdict.rejected.push(FileRejection { file: file.clone(), reason })
                }
                None => verdict.accepted.push(file.clone()),
            }
        }
        verdict
    }

    fn check_file(&self, file: &FileCandidate) -> Option<RejectionReason> {
        if !is_valid_file_name(&file.file_name) {
            return Some(RejectionReason::InvalidName);
        }
        if !self.is_allowed_type(&file.content_type) {
            return Some(RejectionReason::TypeNotAllowed {
                content_type: file.content_type.trim().to_string(),
            });
        }
        if file.size_bytes == 0 {
            return Some(RejectionReason::Empty);
        }
        if file.size_bytes > self.policy.max_size_bytes {
            return Some(RejectionReason::TooLarge { max_size_bytes: self.policy.max_size_bytes });
        }
        None
    }

    fn is_allowed_type(&self, content_type: &str) -> bool {
        let essence = media_type_essence(content_type);
        self.policy.allowed_types.iter().any(|allowed| media_type_essence(allowed) == essence)
    }
}

/// `Text/CSV; charset=utf-8` -> `text/csv`
fn media_type_essence(content_type: &str) -> String {
    content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase()
}

fn is_valid_file_name(file_name: &str) -> bool {
    let trimmed = file_name.trim();
    !trimmed.is_empty()
        && trimmed != "."
        && trimmed != ".."
        && trimmed.chars().count() <= MAX_FILE_NAME_CHARS
        && !trimmed.chars().any(|ch| ch == '/' || ch == '\\' || ch.is_control())
}

#[cfg(test)]
mod tests {
    use super::{AttachmentGuard, AttachmentPolicy, RejectionReason};
    use crate::domain::attachment::FileCandidate;

    const MB: u64 = 1024 * 1024;

    fn pdf(name: &str, size_bytes: u64) -> FileCandidate {
        FileCandidate {
            file_name: name.to_string(),
            size_bytes,
            content_type: "application/pdf".to_string(),
        }
    }

    #[test]
    fn oversized_batch_is_rejected_whole_with_capacity_reason() {
        let guard = AttachmentGuard::default();
        let files: Vec<FileCandidate> = (0..11).map(|i| pdf(&format!("nf-{i}.pdf"), MB)).collect();

        let verdict = guard.accept(0, &files);

        assert!(verdict.accepted.is_empty());
        assert_eq!(verdict.rejected.len(), 11);
        assert!(verdict.rejected.iter().all(|rejection| matches!(
            rejection.reason,
            RejectionReason::Capacity { max_files: 10, remaining: 10 }
        )));
    }

    #[test]
    fn existing_attachments_reduce_remaining_quota() {
        let guard = AttachmentGuard::default();
        let files = vec![pdf("a.pdf", MB), pdf("b.pdf", MB)];

        let verdict = guard.accept(9, &files);
        assert!(verdict.accepted.is_empty());
        assert!(matches!(
            verdict.rejected[0].reason,
            RejectionReason::Capacity { remaining: 1, .. }
        ));

        let verdict = guard.accept(8, &files);
        assert_eq!(verdict.accepted.len(), 2);
    }

    #[test]
    fn per_file_reasons_keep_input_order() {
        let guard = AttachmentGuard::new(AttachmentPolicy {
            max_files: 10,
            max_size_bytes: 50 * MB,
            allowed_types: vec!["application/pdf".to_string(), "text/csv".to_string()],
        });
        let files = vec![
            pdf("contrato.pdf", 2 * MB),
            pdf("enorme.pdf", 51 * MB),
            FileCandidate {
                file_name: "setup.exe".to_string(),
                size_bytes: MB,
                content_type: "application/x-msdownload".to_string(),
            },
            FileCandidate {
                file_name: "dados.csv".to_string(),
                size_bytes: 10,
                content_type: "Text/CSV; charset=utf-8".to_string(),
            },
            pdf("vazio.pdf", 0),
            pdf("../../etc/passwd", 10),
        ];

        let verdict = guard.accept(0, &files);

        let accepted: Vec<&str> =
            verdict.accepted.iter().map(|file| file.file_name.as_str()).collect();
        assert_eq!(accepted, vec!["contrato.pdf", "dados.csv"]);

        let reasons: Vec<&RejectionReason> =
            verdict.rejected.iter().map(|rejection| &rejection.reason).collect();
        assert_eq!(
            reasons,
            vec![
                &RejectionReason::TooLarge { max_size_bytes: 50 * MB },
                &RejectionReason::TypeNotAllowed {
                    content_type: "application/x-msdownload".to_string()
                },
                &RejectionReason::Empty,
                &RejectionReason::InvalidName,
            ]
        );
        assert_eq!(verdict.accepted.len() + verdict.rejected.len(), files.len());
    }

    #[test]
    fn accepted_files_always_satisfy_policy() {
        let guard = AttachmentGuard::default();
        let files = vec![
            pdf("ok.pdf", 50 * MB),
            pdf("over.pdf", 50 * MB + 1),
            FileCandidate {
                file_name: "foto.png".to_string(),
                size_bytes: 1,
                content_type: "image/png".to_string(),
            },
        ];

        let verdict = guard.accept(0, &files);
        let policy = guard.policy();
        assert!(verdict.accepted.len() <= policy.max_files);
        for file in &verdict.accepted {
            assert!(file.size_bytes <= policy.max_size_bytes);
            assert!(policy.allowed_types.contains(&file.content_type));
        }
        assert_eq!(verdict.accepted.len(), 2);
    }

    #[test]
    fn capacity_message_is_actionable() {
        let reason = RejectionReason::Capacity { max_files: 10, remaining: 3 };
        assert!(reason.message().contains("10 arquivos"));
        assert_eq!(RejectionReason::Empty.message(), "arquivo vazio");
    }
}
