use thiserror::Error;
use weave_graph::GraphError;
use weave_types::FourCc;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Failures reading or writing snapshot files. All of them are recoverable:
/// the caller keeps its current document.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("not a weave snapshot file")]
    BadMagic,

    #[error("file tag mismatch: expected {expected}, found {found}")]
    TagMismatch { expected: String, found: String },

    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("checksum mismatch: stored {stored:08x}, computed {computed:08x}")]
    Checksum { stored: u32, computed: u32 },

    #[error("truncated snapshot file")]
    Truncated,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("snapshot does not fit the document: {0}")]
    Graph(#[from] GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Malformed wire data. Transient: the peer may resend or reconnect.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid message type: {0}")]
    InvalidMessageType(FourCc),

    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("framing error: {0}")]
    FramingError(String),

    #[error("frame tagged {tag} carries a {found} message")]
    TagMismatch { tag: FourCc, found: FourCc },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
