use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weave_graph::{Graph, GraphResult, Position, SnapshotNode, SnapshotValue};
use weave_schema::ClassId;
use weave_types::{fatal, Ref};

use crate::binary::{decode_mold, encode_mold};
use crate::error::CodecResult;

/// Partial capture of one object, split by the class that declares each
/// member. Casting it to any class in the source's inheritance chain builds
/// a new object carrying the fields that class understands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mold {
    version: String,
    source: ClassId,
    entries: BTreeMap<ClassId, Vec<(String, SnapshotNode)>>,
}

impl Mold {
    /// Capture the current state of `obj`.
    pub fn make(graph: &Graph, obj: Ref) -> Mold {
        let registry = graph.registry();
        let source = graph.class_of(obj);
        let captured = graph.capture(obj);
        let members = captured.value.members().unwrap_or_default();
        let mut entries = BTreeMap::new();
        for class in registry.chain(source) {
            let own: Vec<(String, SnapshotNode)> = registry
                .class(class)
                .own_members()
                .iter()
                .filter_map(|m| members.iter().find(|(name, _)| *name == m.name).cloned())
                .collect();
            entries.insert(class, own);
        }
        Mold { version: registry.version().to_string(), source, entries }
    }

    /// Class of the captured object.
    pub fn source(&self) -> ClassId {
        self.source
    }

    /// Whether the capture can be cast to `class`.
    pub fn has(&self, class: ClassId) -> bool {
        self.entries.contains_key(&class)
    }

    /// Insert a new `class` instance into `container` holding the captured
    /// fields of `class` and its bases. Casting to a class the mold does
    /// not have is a contract violation.
    pub fn cast(
        &self,
        graph: &mut Graph,
        container: Ref,
        class: ClassId,
        position: Position,
    ) -> GraphResult<Ref> {
        let members = self.members_for(graph, class);
        let registry = graph.registry().clone();
        let node = SnapshotNode {
            id: Ref::NULL,
            value: SnapshotValue::Object { class: registry.class(class).name().to_string(), members },
        };
        graph.insert_copy(container, &node, position)
    }

    /// Overwrite the fields declared by `class` and its bases on an existing
    /// object, which must be a `class`.
    pub fn apply(&self, graph: &mut Graph, obj: Ref, class: ClassId) -> GraphResult<()> {
        let members = self.members_for(graph, class);
        if !graph.is_a(obj, class) {
            fatal!("{obj:?} is not a {}", graph.registry().class(class).name());
        }
        graph.assign_members(obj, &members)
    }

    fn members_for(&self, graph: &Graph, class: ClassId) -> Vec<(String, SnapshotNode)> {
        if !self.has(class) {
            fatal!("mold of {:?} cannot be cast to {class:?}", self.source);
        }
        let registry = graph.registry();
        if registry.version() != self.version {
            fatal!("mold written by schema {} cast into {}", self.version, registry.version());
        }
        let mut members = Vec::new();
        for c in registry.chain(class).into_iter().rev() {
            if let Some(entry) = self.entries.get(&c) {
                members.extend(entry.iter().cloned());
            }
        }
        members
    }

    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        encode_mold(self)
    }

    pub fn from_bytes(data: &[u8]) -> CodecResult<Mold> {
        decode_mold(data)
    }
}
