// =============================================================================
// Input error taxonomy
// =============================================================================
//
// These are local, recoverable conditions. The engine converts every one of
// them into a zeroed term plus an `InputIssue` record; none of them crosses
// the evaluation boundary as a failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    /// Non-numeric, non-finite or out-of-range value.
    #[error("invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Required fields for a computation are missing.
    #[error("{0} unavailable")]
    Unavailable(String),

    /// Not enough observations for a statistic.
    #[error("insufficient sample: need {required}, have {available}")]
    InsufficientSample { required: usize, available: usize },
}

impl InputError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Record of an input condition that zeroed a term during evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputIssue {
    /// Ticker or indicator the issue pertains to.
    pub source: String,
    pub message: String,
}

impl InputIssue {
    pub fn new(source: impl Into<String>, error: &InputError) -> Self {
        Self {
            source: source.into(),
            message: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_descriptive() {
        let e = InputError::invalid("VALE.after_market_pct", "|value| 72.0 exceeds 50");
        assert_eq!(
            e.to_string(),
            "invalid input for VALE.after_market_pct: |value| 72.0 exceeds 50"
        );
        let e = InputError::InsufficientSample {
            required: 2,
            available: 1,
        };
        assert_eq!(e.to_string(), "insufficient sample: need 2, have 1");
    }

    #[test]
    fn issue_carries_source() {
        let issue = InputIssue::new("ITUB", &InputError::Unavailable("closing price".into()));
        assert_eq!(issue.source, "ITUB");
        assert_eq!(issue.message, "closing price unavailable");
    }
}
