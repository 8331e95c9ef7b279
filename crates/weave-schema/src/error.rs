use thiserror::Error;

/// Recoverable lookup failures. Declaration mistakes are fatal instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("unknown enum: {0}")]
    UnknownEnum(String),

    #[error("class {class} has no member {member}")]
    UnknownMember { class: String, member: String },

    #[error("enum {name} has no enumerator {enumerator}")]
    UnknownEnumerator { name: String, enumerator: String },

    #[error("schema version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },
}

pub type SchemaResult<T> = Result<T, SchemaError>;
