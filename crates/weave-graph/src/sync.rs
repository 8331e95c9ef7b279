use weave_types::{fatal, Ref};

use crate::graph::Graph;
use crate::node::{MoveLink, Payload, Presence};

/// What happens to elements moved into a subtree that is being destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Purge {
    /// Synchronize: everything still in the subtree dies with it.
    Sync,
    /// Local erase: moved-in elements return to their origin, erased.
    Erase,
    /// Revert: moved-in elements return to their origin, intact.
    Revert,
}

enum Child {
    Node(Ref),
    Slot { key: crate::node::ContainerKey, elem: Ref, state: Presence, link: Option<MoveLink> },
}

impl Graph {
    fn children(&self, r: Ref) -> Vec<Child> {
        match &self.node(r).payload {
            Payload::Object { members, .. } => members.iter().map(|m| Child::Node(*m)).collect(),
            Payload::Container(c) => c
                .slots
                .iter()
                .map(|(key, s)| Child::Slot {
                    key: key.clone(),
                    elem: s.elem,
                    state: s.state,
                    link: s.link.clone(),
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Fold the pending diff into the baseline and clear all change state.
    pub fn synchronize(&mut self) {
        self.sync_node(Ref::ROOT);
    }

    fn sync_node(&mut self, r: Ref) {
        let node = self.node_mut(r);
        if !node.is_pending() {
            return;
        }
        node.presence = Presence::Resident;
        node.modifications = 0;
        match &mut node.payload {
            Payload::Scalar { value, before } => *before = value.clone(),
            Payload::Message { pending } => pending.clear(),
            Payload::Object { .. } | Payload::Container(_) => {}
        }
        for child in self.children(r) {
            match child {
                Child::Node(m) => self.sync_node(m),
                Child::Slot { key, elem, state, link } => match (state, link) {
                    (Presence::Resident, _) => self.sync_node(elem),
                    (Presence::Added, _) => {
                        if let Some(c) = self.node_mut(r).container_mut() {
                            if let Some(slot) = c.slots.get_mut(&key) {
                                slot.state = Presence::Resident;
                                slot.link = None;
                            }
                        }
                        self.sync_node(elem);
                    }
                    (Presence::Removed, moved) => {
                        if let Some(c) = self.node_mut(r).container_mut() {
                            c.slots.remove(&key);
                        }
                        if moved.is_none() {
                            self.purge(elem, Purge::Sync);
                        }
                    }
                },
            }
        }
    }

    /// Discard the pending diff, returning to the baseline.
    pub fn revert(&mut self) {
        self.revert_node(Ref::ROOT);
    }

    pub(crate) fn revert_node(&mut self, r: Ref) {
        let node = self.node_mut(r);
        if !node.is_pending() {
            return;
        }
        match &mut node.payload {
            Payload::Scalar { value, before } => *value = before.clone(),
            Payload::Message { pending } => pending.clear(),
            Payload::Object { .. } | Payload::Container(_) => {}
        }
        for child in self.children(r) {
            match child {
                Child::Node(m) => self.revert_node(m),
                Child::Slot { key, elem, state, link } => match (state, link) {
                    (Presence::Resident, _) => self.revert_node(elem),
                    (Presence::Added, None) => {
                        if let Some(c) = self.node_mut(r).container_mut() {
                            c.slots.remove(&key);
                        }
                        self.purge(elem, Purge::Revert);
                    }
                    (Presence::Added, Some(origin)) => {
                        if let Some(c) = self.node_mut(r).container_mut() {
                            c.slots.remove(&key);
                        }
                        self.return_restored(elem, origin);
                    }
                    (Presence::Removed, None) => {
                        if let Some(c) = self.node_mut(r).container_mut() {
                            if let Some(slot) = c.slots.get_mut(&key) {
                                slot.state = Presence::Resident;
                            }
                        }
                        self.mark_subtree(elem, Presence::Resident);
                        self.force_revert(elem);
                    }
                    // Restored from the destination side.
                    (Presence::Removed, Some(_)) => {}
                },
            }
        }
        let node = self.node_mut(r);
        node.presence = Presence::Resident;
        node.modifications = 0;
    }

    /// Revert a subtree whose counters may already read zero.
    fn force_revert(&mut self, r: Ref) {
        let node = self.node_mut(r);
        node.modifications = node.modifications.max(1);
        self.revert_node(r);
    }

    fn return_restored(&mut self, elem: Ref, origin: MoveLink) {
        match self.node_mut(origin.container).container_mut().and_then(|c| c.slots.get_mut(&origin.key)) {
            Some(slot) => {
                slot.state = Presence::Resident;
                slot.link = None;
            }
            None => fatal!("move origin of {elem:?} vanished"),
        }
        self.set_location(elem, origin.container, origin.key);
        self.force_revert(elem);
    }

    /// Unbind a subtree.
    pub(crate) fn purge(&mut self, r: Ref, mode: Purge) {
        let children = match self.nodes.get(&r) {
            Some(_) => self.children(r),
            None => return,
        };
        self.nodes.remove(&r);
        for child in children {
            match child {
                Child::Node(m) => self.purge(m, mode),
                Child::Slot { elem, state, link, .. } => match (state, link, mode) {
                    (Presence::Removed, Some(_), _) => {}
                    (Presence::Added, Some(origin), Purge::Erase) => self.return_erased(elem, origin),
                    (Presence::Added, Some(origin), Purge::Revert) => self.return_restored(elem, origin),
                    _ => self.purge(elem, mode),
                },
            }
        }
    }

    /// Set the presence of a subtree. Restoring to resident keeps elements
    /// added in the current window marked as added and leaves erased slots
    /// untouched.
    pub(crate) fn mark_subtree(&mut self, r: Ref, presence: Presence) {
        self.node_mut(r).presence = presence;
        for child in self.children(r) {
            match child {
                Child::Node(m) => self.mark_subtree(m, presence),
                Child::Slot { elem, state, link, .. } => match (state, link) {
                    // Erased or moved out separately; restored on their own.
                    (Presence::Removed, _) => {}
                    (Presence::Added, None) if presence == Presence::Resident => {
                        self.mark_subtree(elem, Presence::Added)
                    }
                    _ => self.mark_subtree(elem, presence),
                },
            }
        }
    }
}
