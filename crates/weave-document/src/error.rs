use std::time::Duration;

use thiserror::Error;
use weave_codec::SnapshotError;
use weave_graph::GraphError;
use weave_history::HistoryError;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("connection not established within {0:?}")]
    ConnectTimeout(Duration),

    #[error("connection failed before the document was loaded")]
    ConnectFailed,

    #[error("backend does not fit the document: {0}")]
    Backend(#[from] GraphError),

    #[error("snapshot file: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("history: {0}")]
    History(#[from] HistoryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DocumentResult<T> = Result<T, DocumentError>;
