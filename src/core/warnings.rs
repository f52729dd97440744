use super::error::EngineError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Recoverable problems met while compiling or replaying a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Warning {
    /// A date field did not resolve; the item takes no part in the run.
    UnresolvedDate {
        item: String,
        field: String,
        error: EngineError,
    },
    /// An amount, growth or period did not decode; the item takes no part
    /// in the run.
    UnusableValue {
        item: String,
        field: String,
        error: EngineError,
    },
    /// One occurrence failed and was skipped; later occurrences still run.
    SkippedEvent {
        item: String,
        date: NaiveDate,
        error: EngineError,
    },
}

impl Warning {
    pub fn item(&self) -> &str {
        match self {
            Warning::UnresolvedDate { item, .. }
            | Warning::UnusableValue { item, .. }
            | Warning::SkippedEvent { item, .. } => item,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnresolvedDate { item, field, error } => {
                write!(f, "{item}: {field}: {error}")
            }
            Warning::UnusableValue { item, field, error } => {
                write!(f, "{item}: {field}: {error}")
            }
            Warning::SkippedEvent { item, date, error } => {
                write!(f, "{item} on {date} skipped: {error}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let warning = Warning::UnresolvedDate {
            item: "Salary".into(),
            field: "start".into(),
            error: EngineError::invalid_date("someday"),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["type"], "UnresolvedDate");
        assert_eq!(json["error"]["kind"], "InvalidDate");
        assert_eq!(
            warning.to_string(),
            "Salary: start: invalid date expression: \"someday\""
        );
    }
}
