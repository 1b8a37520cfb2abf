use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CorpFinanceError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Invalid input: {function} requires at least one negative and one positive cash flow")]
    NoSignChange { function: String },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (last estimate: {last_estimate}, delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_estimate: Decimal,
        last_delta: Decimal,
    },

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Broad failure category. Every error the core produces falls in one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidInput,
    DivisionByZero,
    NoConvergence,
}

impl CorpFinanceError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CorpFinanceError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CorpFinanceError::InvalidInput { .. }
            | CorpFinanceError::NoSignChange { .. }
            | CorpFinanceError::DateError(_)
            | CorpFinanceError::SerializationError(_) => ErrorKind::InvalidInput,
            CorpFinanceError::DivisionByZero { .. } => ErrorKind::DivisionByZero,
            CorpFinanceError::ConvergenceFailure { .. } => ErrorKind::NoConvergence,
        }
    }

    /// Stable, documented reason code surfaced to callers of the CLI and bindings.
    pub fn reason_code(&self) -> &'static str {
        match self {
            CorpFinanceError::InvalidInput { .. } | CorpFinanceError::DateError(_) => {
                "InvalidInput"
            }
            CorpFinanceError::NoSignChange { .. } => "NoSignChange",
            CorpFinanceError::DivisionByZero { .. } => "DivisionByZero",
            CorpFinanceError::ConvergenceFailure { .. } => "NoConvergence",
            CorpFinanceError::SerializationError(_) => "SerializationError",
        }
    }

    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            code: self.reason_code().to_string(),
            message: self.to_string(),
        }
    }
}

/// Caller-visible form of a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
}

impl From<serde_json::Error> for CorpFinanceError {
    fn from(e: serde_json::Error) -> Self {
        CorpFinanceError::SerializationError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reason_codes_are_stable() {
        let no_sign = CorpFinanceError::NoSignChange {
            function: "IRR".into(),
        };
        assert_eq!(no_sign.reason_code(), "NoSignChange");
        assert_eq!(no_sign.kind(), ErrorKind::InvalidInput);

        let div = CorpFinanceError::DivisionByZero {
            context: "MOIC".into(),
        };
        assert_eq!(div.reason_code(), "DivisionByZero");

        let conv = CorpFinanceError::ConvergenceFailure {
            function: "XIRR".into(),
            iterations: 100,
            last_estimate: dec!(0.5),
            last_delta: dec!(0.01),
        };
        assert_eq!(conv.reason_code(), "NoConvergence");
        assert_eq!(conv.kind(), ErrorKind::NoConvergence);
        assert!(conv.to_string().contains("100 iterations"));
    }

    #[test]
    fn test_report_carries_code_and_message() {
        let report = CorpFinanceError::invalid("rate", "must be greater than -100%").to_report();
        assert_eq!(report.code, "InvalidInput");
        assert!(report.message.contains("rate"));
    }
}
