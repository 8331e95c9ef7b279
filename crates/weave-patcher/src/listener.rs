use weave_document::DocumentObserver;
use weave_graph::{Graph, Presence, SlotView};
use weave_types::Ref;

use crate::patcher::Patcher;

/// Engine-side view of patcher changes, as an object runtime consumes them.
///
/// Removed objects and links are still readable in `graph` while their
/// callback runs.
pub trait PatcherListener: Send {
    fn object_added(&mut self, graph: &Graph, obj: Ref);
    fn object_removed(&mut self, graph: &Graph, obj: Ref);
    fn link_added(&mut self, graph: &Graph, link: Ref);
    fn link_removed(&mut self, graph: &Graph, link: Ref);

    /// An object that was already there changed, for instance moved.
    fn object_changed(&mut self, _graph: &Graph, _obj: Ref) {}
}

/// Document observer dispatching patcher changes to a [`PatcherListener`].
///
/// Links are removed before the objects they connect and added after them,
/// so a runtime never sees a link to a missing object.
pub struct PatcherObserver<L> {
    patcher: Patcher,
    listener: L,
}

impl<L: PatcherListener> PatcherObserver<L> {
    pub fn new(patcher: Patcher, listener: L) -> Self {
        Self { patcher, listener }
    }

    pub fn listener(&self) -> &L {
        &self.listener
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    /// Dispatch the pending changes of `graph`.
    pub fn dispatch(&mut self, graph: &Graph) {
        let links = graph.slots(self.patcher.links_container());
        let objects = graph.slots(self.patcher.objects_container());

        for link in with_state(&links, Presence::Removed) {
            self.listener.link_removed(graph, link);
        }
        for obj in with_state(&objects, Presence::Removed) {
            self.listener.object_removed(graph, obj);
        }
        for obj in with_state(&objects, Presence::Added) {
            self.listener.object_added(graph, obj);
        }
        for link in with_state(&links, Presence::Added) {
            self.listener.link_added(graph, link);
        }
        for slot in objects.iter().filter(|s| s.state == Presence::Resident) {
            if graph.changed(slot.elem) {
                self.listener.object_changed(graph, slot.elem);
            }
        }
    }
}

/// Elements entering or leaving, reorderings excluded.
fn with_state(slots: &[SlotView], state: Presence) -> impl Iterator<Item = Ref> + '_ {
    slots.iter().filter(move |s| s.state == state && !s.moved).map(|s| s.elem)
}

impl<L: PatcherListener> DocumentObserver for PatcherObserver<L> {
    fn document_changed(&mut self, graph: &Graph) {
        self.dispatch(graph);
    }
}
