use thiserror::Error;
use weave_graph::Graph;
use weave_tx::Transaction;

/// Reason a validator gave for refusing a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct Rejection(pub String);

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Semantic check the server runs on every transaction that applied.
///
/// `graph` holds `tx` as its pending diff, so removed nodes are still
/// readable and the change flags tell what `tx` touched. A rejection makes
/// the server revert `tx` and deny it.
pub trait DocumentValidator: Send {
    fn validate(&self, graph: &Graph, tx: &Transaction) -> Result<(), Rejection>;
}

impl<F> DocumentValidator for F
where
    F: Fn(&Graph, &Transaction) -> Result<(), Rejection> + Send,
{
    fn validate(&self, graph: &Graph, tx: &Transaction) -> Result<(), Rejection> {
        self(graph, tx)
    }
}
