use thiserror::Error;

#[derive(Error, Debug)]
pub enum DreError {
    #[error("Invalid {tax} rate {rate} for regime {regime}: must be finite and non-negative")]
    InvalidRate {
        regime: String,
        tax: String,
        rate: f64,
    },

    #[error("Invalid classifier policy: {0}")]
    InvalidPolicy(String),

    #[error("Statement line {line} does not balance: expected {expected}, got {actual}")]
    StatementImbalance {
        line: String,
        expected: f64,
        actual: f64,
    },

    #[error("Invalid month filter '{0}': expected YYYY-MM")]
    InvalidMonth(String),

    #[error("Report not found: {0}")]
    ReportNotFound(String),

    #[error("Expense {expense_id} not found in report {report_id}")]
    ExpenseNotFound {
        report_id: String,
        expense_id: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DreError::ReportNotFound(_) | DreError::ExpenseNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, DreError>;
