use thiserror::Error;
use weave_schema::{ClassId, SchemaError};
use weave_types::Ref;

/// Recoverable graph failures: a transaction that does not apply, or a
/// snapshot that does not match the schema.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("no node bound at {0:?}")]
    MissingNode(Ref),

    #[error("node {node:?} is not a {expected}")]
    KindMismatch { node: Ref, expected: &'static str },

    #[error("node {0:?} is removed")]
    RemovedNode(Ref),

    #[error("enumerator index {index} is out of range for {node:?}")]
    InvalidEnumerator { node: Ref, index: i64 },

    #[error("value of {0:?} differs from the transaction's before-value")]
    ValueMismatch(Ref),

    #[error("container {container:?} has no live element {elem:?} at the given key")]
    MissingElement { container: Ref, elem: Ref },

    #[error("container {0:?} already holds an element at the given key")]
    KeyOccupied(Ref),

    #[error("ref {0:?} is already bound")]
    RefInUse(Ref),

    #[error("class {class:?} cannot be stored in container {container:?}")]
    ClassMismatch { container: Ref, class: ClassId },

    #[error("moving {elem:?} into {container:?} would create a cycle")]
    Cycle { elem: Ref, container: Ref },

    #[error("schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("snapshot does not match the schema: {0}")]
    SnapshotMismatch(String),
}

pub type GraphResult<T> = Result<T, GraphError>;
