use weave_graph::Graph;

/// Receives one callback per commit and per pull that changed something.
///
/// The change flags of the graph (`added`, `removed`, `changed`, removed
/// container slots) are valid only during the callback. The graph is lent
/// immutably, so observers cannot mutate the document while it notifies.
pub trait DocumentObserver: Send {
    fn document_changed(&mut self, graph: &Graph);
}

impl<F> DocumentObserver for F
where
    F: FnMut(&Graph) + Send,
{
    fn document_changed(&mut self, graph: &Graph) {
        self(graph)
    }
}
