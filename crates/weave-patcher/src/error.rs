use thiserror::Error;
use weave_graph::GraphError;
use weave_schema::SchemaError;
use weave_types::Ref;

#[derive(Debug, Error)]
pub enum PatcherError {
    #[error("{0:?} is not an object of this patcher")]
    UnknownObject(Ref),

    #[error("{0:?} is not a link of this patcher")]
    UnknownLink(Ref),

    #[error("cannot connect {from:?}:{outlet} to {to:?}:{inlet}")]
    CannotConnect { from: Ref, outlet: usize, to: Ref, inlet: usize },

    #[error("no user {0}")]
    UnknownUser(u64),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type PatcherResult<T> = Result<T, PatcherError>;
