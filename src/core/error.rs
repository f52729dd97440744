use serde::{Deserialize, Serialize};

/// Recoverable failures raised while evaluating a single event.
///
/// None of these abort a projection: the orchestrator records a
/// [`Warning`](super::warnings::Warning) and skips the offending event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EngineError {
    #[error("invalid date expression: {expr:?}")]
    InvalidDate { expr: String },
    #[error("'{reference}' does not name any item")]
    UnknownItem { reference: String },
    #[error("malformed amount: {value:?}")]
    MalformedAmount { value: String },
}

impl EngineError {
    pub fn invalid_date(expr: impl Into<String>) -> Self {
        EngineError::InvalidDate { expr: expr.into() }
    }

    pub fn unknown_item(reference: impl Into<String>) -> Self {
        EngineError::UnknownItem {
            reference: reference.into(),
        }
    }

    pub fn malformed(value: impl Into<String>) -> Self {
        EngineError::MalformedAmount {
            value: value.into(),
        }
    }
}
