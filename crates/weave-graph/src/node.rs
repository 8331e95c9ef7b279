use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weave_schema::{ClassId, MemberKind};
use weave_types::{KeyFloat, KeyRandom, Ref};

use crate::value::Value;

/// Lifecycle state of a node or container slot relative to the baseline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Presence {
    /// Created since the last synchronize.
    Added,
    /// Part of the baseline.
    Resident,
    /// Erased since the last synchronize; still readable until then.
    Removed,
}

/// Key of a container slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ContainerKey {
    Float(KeyFloat),
    Random(KeyRandom),
}

impl ContainerKey {
    pub fn as_float(&self) -> Option<&KeyFloat> {
        match self {
            ContainerKey::Float(k) => Some(k),
            ContainerKey::Random(_) => None,
        }
    }

    pub fn as_random(&self) -> Option<&KeyRandom> {
        match self {
            ContainerKey::Random(k) => Some(k),
            ContainerKey::Float(_) => None,
        }
    }
}

/// Where to insert into an array. Collections ignore it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Position {
    Start,
    End,
    Before(Ref),
    After(Ref),
}

/// The other end of a pending move.
///
/// On the destination slot it names where the element came from, on the
/// source slot where it went.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MoveLink {
    pub(crate) container: Ref,
    pub(crate) key: ContainerKey,
}

#[derive(Clone, Debug)]
pub(crate) struct Slot {
    pub(crate) elem: Ref,
    pub(crate) state: Presence,
    pub(crate) link: Option<MoveLink>,
}

/// Read-only view of a container slot, as handed to observers.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotView {
    pub key: ContainerKey,
    pub elem: Ref,
    pub state: Presence,
    /// The slot is one end of a pending move.
    pub moved: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct Container {
    pub(crate) ordered: bool,
    pub(crate) elem_class: ClassId,
    pub(crate) slots: BTreeMap<ContainerKey, Slot>,
}

#[derive(Clone, Debug)]
pub(crate) enum Payload {
    Scalar { value: Value, before: Value },
    Object { class: ClassId, members: Vec<Ref> },
    Container(Container),
    Message { pending: Vec<Vec<u8>> },
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) parent: Ref,
    pub(crate) kind: MemberKind,
    pub(crate) presence: Presence,
    /// Pending change units in this subtree, this node included.
    pub(crate) modifications: u32,
    pub(crate) undo: bool,
    /// Key of the slot holding this node, for container elements.
    pub(crate) slot_key: Option<ContainerKey>,
    pub(crate) payload: Payload,
}

impl Node {
    pub(crate) fn leaf(kind: MemberKind, parent: Ref, presence: Presence, undo: bool) -> Node {
        let payload = match kind {
            MemberKind::Array(c) | MemberKind::Collection(c) => Payload::Container(Container {
                ordered: matches!(kind, MemberKind::Array(_)),
                elem_class: c,
                slots: BTreeMap::new(),
            }),
            MemberKind::Message => Payload::Message { pending: Vec::new() },
            MemberKind::Object(_) => weave_types::fatal!("embedded objects are not leaves"),
            scalar => {
                let value = Value::default_for(scalar).unwrap_or(Value::Bool(false));
                Payload::Scalar { before: value.clone(), value }
            }
        };
        Node {
            parent,
            kind,
            presence,
            modifications: 0,
            undo,
            slot_key: None,
            payload,
        }
    }

    pub(crate) fn container(&self) -> Option<&Container> {
        match &self.payload {
            Payload::Container(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut Container> {
        match &mut self.payload {
            Payload::Container(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.modifications > 0 || self.presence != Presence::Resident
    }
}
