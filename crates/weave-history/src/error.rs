/// Errors produced while persisting or restoring a history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history file is corrupt: {0}")]
    Corrupt(String),

    #[error("history written for schema {found}, expected {expected}")]
    VersionMismatch { expected: String, found: String },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;
