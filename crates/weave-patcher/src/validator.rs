use tracing::debug;
use weave_document::{DocumentValidator, Rejection};
use weave_graph::Graph;
use weave_tx::Transaction;

use crate::patcher::Patcher;

/// Server-side check that every live link joins two live objects.
///
/// Concurrent edits can each be valid alone and still leave a dangling link
/// once ordered: a link to objects another peer removed, or an object removal
/// that misses a link another peer just added. Whichever of the two reaches
/// the server second is denied.
#[derive(Clone, Debug)]
pub struct PatcherValidator {
    patcher: Patcher,
}

impl PatcherValidator {
    pub fn new(patcher: Patcher) -> Self {
        Self { patcher }
    }
}

impl DocumentValidator for PatcherValidator {
    fn validate(&self, graph: &Graph, tx: &Transaction) -> Result<(), Rejection> {
        for link in self.patcher.links(graph) {
            if graph.removed(link) {
                continue;
            }
            let ends = self.patcher.link_ends(graph, link).map_err(|e| Rejection::new(e.to_string()))?;
            for end in [ends.sender, ends.receiver] {
                if !self.patcher.is_object(graph, end) {
                    debug!(id = %tx.id(), ?link, ?end, "link to a missing object");
                    return Err(Rejection::new(format!("link {link:?} points to missing object {end:?}")));
                }
            }
        }
        Ok(())
    }
}
