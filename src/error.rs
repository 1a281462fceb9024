use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpenseDashboardError {
    #[error("Required field '{field}' ({role}) is not present in the record schema")]
    MissingField { field: String, role: String },

    #[error("Invalid grouping: {0}")]
    InvalidGrouping(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Malformed source data: {0}")]
    MalformedSource(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExpenseDashboardError>;
