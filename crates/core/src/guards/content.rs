use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::request::{RequestContent, SubmissionFields};

pub const TITLE_MAX_CHARS: usize = 200;
pub const DESCRIPTION_MAX_CHARS: usize = 2000;
pub const JUSTIFICATION_MAX_CHARS: usize = 1000;
pub const PERIOD_MAX_CHARS: usize = 100;
pub const COMMENT_MAX_CHARS: usize = 1000;

lazy_static! {
    // Coarse denial list. A match rejects the whole submission; nothing is stripped.
    static ref UNSAFE_PATTERNS: Vec<Regex> = [
        // tag openings: <script, </div, <!--, <?xml, <img
        r"<\s*[/!?]?\s*[a-zA-Z!]",
        // protocol handlers
        r"(?i)\b(?:javascript|vbscript|livescript)\s*:",
        r"(?i)\bdata\s*:\s*text/html",
        // inline event handler attributes: onclick=, onerror =
        r"(?i)\bon[a-z]{3,}\s*=",
        // legacy css expressions
        r"(?i)\bexpression\s*\(",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("unsafe content pattern must compile"))
    .collect();

    // Plain digits with at most one decimal separator. No sign, exponent or grouping.
    static ref AMOUNT_PATTERN: Regex =
        Regex::new(r"^[0-9]+(?:[.,][0-9]+)?$").expect("amount pattern must compile");
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Description,
    Period,
    RequestType,
    Justification,
    RequestedAmount,
    Comment,
}

impl Field {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Title => "título",
            Self::Description => "descrição",
            Self::Period => "período",
            Self::RequestType => "tipo",
            Self::Justification => "justificativa",
            Self::RequestedAmount => "valor solicitado",
            Self::Comment => "comentário",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentIssue {
    MissingField { field: Field },
    TooLong { field: Field, max_chars: usize },
    InvalidAmount,
    /// Deliberately carries no detail about which pattern matched.
    UnsafeContent,
}

impl ContentIssue {
    pub fn message(&self) -> String {
        match self {
            Self::MissingField { field } => format!("campo obrigatório: {}", field.label()),
            Self::TooLong { field, max_chars } => {
                format!("{} excede {max_chars} caracteres", field.label())
            }
            Self::InvalidAmount => {
                "valor solicitado deve ser um número decimal não negativo".to_string()
            }
            Self::UnsafeContent => "conteúdo rejeitado".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub ok: bool,
    pub errors: Vec<ContentIssue>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<ContentIssue>) -> Self {
        Self { ok: errors.is_empty(), errors }
    }

    pub fn is_security_rejection(&self) -> bool {
        self.errors.contains(&ContentIssue::UnsafeContent)
    }
}

/// Stateless field validation and unsafe-content screening.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContentValidator;

impl ContentValidator {
    pub fn validate(&self, fields: &SubmissionFields) -> ValidationOutcome {
        let mut errors = Vec::new();

        require(&mut errors, Field::Title, &fields.title);
        require(&mut errors, Field::Description, &fields.description);
        require(&mut errors, Field::Period, &fields.period);
        require(&mut errors, Field::RequestType, &fields.request_type);

        limit(&mut errors, Field::Title, &fields.title, TITLE_MAX_CHARS);
        limit(&mut errors, Field::Description, &fields.description, DESCRIPTION_MAX_CHARS);
        limit(&mut errors, Field::Period, &fields.period, PERIOD_MAX_CHARS);
        if let Some(justification) = &fields.justification {
            limit(&mut errors, Field::Justification, justification, JUSTIFICATION_MAX_CHARS);
        }

        if let Some(raw) = present(fields.requested_amount.as_deref()) {
            if parse_amount(raw).is_none() {
                errors.push(ContentIssue::InvalidAmount);
            }
        }

        let free_text = [
            fields.title.as_str(),
            fields.description.as_str(),
            fields.period.as_str(),
            fields.request_type.as_str(),
            fields.justification.as_deref().unwrap_or_default(),
        ]
        .join("\n");
        if is_unsafe(&free_text) {
            errors.push(ContentIssue::UnsafeContent);
        }

        ValidationOutcome::from_errors(errors)
    }

    /// Validates and produces the trimmed content the lifecycle stores.
    pub fn accept(&self, fields: &SubmissionFields) -> Result<RequestContent, Vec<ContentIssue>> {
        let outcome = self.validate(fields);
        if !outcome.ok {
            return Err(outcome.errors);
        }

        Ok(RequestContent {
            title: fields.title.trim().to_string(),
            description: fields.description.trim().to_string(),
            period: fields.period.trim().to_string(),
            request_type: fields.request_type.trim().to_string(),
            priority: fields.priority,
            justification: present(fields.justification.as_deref()).map(str::to_string),
            requested_amount: present(fields.requested_amount.as_deref()).and_then(parse_amount),
        })
    }

    /// Decision comments are optional but screened like any other free text.
    pub fn validate_comment(&self, comment: Option<&str>) -> ValidationOutcome {
        let mut errors = Vec::new();
        if let Some(comment) = comment {
            limit(&mut errors, Field::Comment, comment, COMMENT_MAX_CHARS);
            if is_unsafe(comment) {
                errors.push(ContentIssue::UnsafeContent);
            }
        }
        ValidationOutcome::from_errors(errors)
    }
}

fn require(errors: &mut Vec<ContentIssue>, field: Field, value: &str) {
    if value.trim().is_empty() {
        errors.push(ContentIssue::MissingField { field });
    }
}

fn limit(errors: &mut Vec<ContentIssue>, field: Field, value: &str, max_chars: usize) {
    if value.trim().chars().count() > max_chars {
        errors.push(ContentIssue::TooLong { field, max_chars });
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn is_unsafe(text: &str) -> bool {
    UNSAFE_PATTERNS.iter().any(|pattern| pattern.is_match(text))
}

/// Accepts `1234.56` and the Brazilian `1234,56`; thousands separators are
/// not supported.
fn parse_amount(raw: &str) -> Option<Decimal> {
    if !AMOUNT_PATTERN.is_match(raw) {
        return None;
    }
    Decimal::from_str(&raw.replace(',', ".")).ok()
}
