use std::sync::Arc;

use serde::{Deserialize, Serialize};
use weave_schema::{ClassId, ClassRegistry, MemberKind};
use weave_types::{KeyFloat, KeyRandom, Ref};

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{ContainerKey, Payload, Position, Presence};
use crate::value::Value;

/// Whole-document image of the committed baseline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version of the registry that wrote it.
    pub version: String,
    pub root: SnapshotNode,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: Ref,
    pub value: SnapshotValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SnapshotValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Enumerator name.
    Enum(String),
    Blob(Vec<u8>),
    ObjectRef(Ref),
    Message,
    Object { class: String, members: Vec<(String, SnapshotNode)> },
    Array(Vec<(KeyFloat, SnapshotNode)>),
    Collection(Vec<(KeyRandom, SnapshotNode)>),
}

impl SnapshotValue {
    /// Members of an object node.
    pub fn members(&self) -> Option<&[(String, SnapshotNode)]> {
        match self {
            SnapshotValue::Object { members, .. } => Some(members),
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<&SnapshotNode> {
        self.members()?.iter().find(|(n, _)| n == name).map(|(_, node)| node)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum View {
    Baseline,
    Current,
}

fn mismatch(what: impl Into<String>) -> GraphError {
    GraphError::SnapshotMismatch(what.into())
}

impl Graph {
    /// Image of the committed baseline: pending edits are not included.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            version: self.registry.version().to_string(),
            root: self.write_node(Ref::ROOT, View::Baseline),
        }
    }

    /// Image of an object as it currently reads, pending edits included.
    pub fn capture(&self, obj: Ref) -> SnapshotNode {
        self.write_node(obj, View::Current)
    }

    fn write_node(&self, r: Ref, view: View) -> SnapshotNode {
        let node = self.node(r);
        let value = match &node.payload {
            Payload::Scalar { value, before } => {
                let v = if view == View::Baseline { before } else { value };
                match v {
                    Value::Bool(b) => SnapshotValue::Bool(*b),
                    Value::Int(i) => SnapshotValue::Int(*i),
                    Value::Float(f) => SnapshotValue::Float(*f),
                    Value::Enum(i) => {
                        let name = match node.kind {
                            MemberKind::Enum(id) => self.registry.enum_class(id).enumerator(*i),
                            _ => None,
                        };
                        SnapshotValue::Enum(name.unwrap_or_default().to_string())
                    }
                    Value::Blob(b) => SnapshotValue::Blob(b.clone()),
                    Value::ObjectRef(t) => SnapshotValue::ObjectRef(*t),
                }
            }
            Payload::Message { .. } => SnapshotValue::Message,
            Payload::Object { class, members } => {
                let desc = self.registry.class(*class);
                SnapshotValue::Object {
                    class: desc.name().to_string(),
                    members: desc
                        .members()
                        .iter()
                        .zip(members)
                        .map(|(m, mr)| (m.name.clone(), self.write_node(*mr, view)))
                        .collect(),
                }
            }
            Payload::Container(c) => {
                let visible = c.slots.iter().filter(|(_, s)| match view {
                    View::Baseline => s.state != Presence::Added,
                    View::Current => s.state != Presence::Removed,
                });
                if c.ordered {
                    SnapshotValue::Array(
                        visible
                            .filter_map(|(k, s)| Some((k.as_float()?.clone(), self.write_node(s.elem, view))))
                            .collect(),
                    )
                } else {
                    SnapshotValue::Collection(
                        visible
                            .filter_map(|(k, s)| Some((*k.as_random()?, self.write_node(s.elem, view))))
                            .collect(),
                    )
                }
            }
        };
        SnapshotNode { id: r, value }
    }

    /// A graph holding `snapshot` as its baseline.
    pub fn from_snapshot(
        registry: Arc<ClassRegistry>,
        actor: u32,
        snapshot: &Snapshot,
    ) -> GraphResult<Graph> {
        let mut graph = Graph::new(registry, actor);
        graph.load_snapshot(snapshot)?;
        graph.synchronize();
        Ok(graph)
    }

    /// Replace the whole graph with `snapshot`.
    ///
    /// The loaded content is left pending, as if just added, so observers
    /// can walk it before the next synchronize. On error the graph is left
    /// holding a default root.
    pub fn load_snapshot(&mut self, snapshot: &Snapshot) -> GraphResult<()> {
        self.registry.check_version(&snapshot.version)?;
        self.build_root();
        let result = self.load_root(&snapshot.root);
        if result.is_err() {
            self.build_root();
        }
        result
    }

    fn load_root(&mut self, root: &SnapshotNode) -> GraphResult<()> {
        if root.id != Ref::ROOT {
            return Err(mismatch(format!("root id {:?}", root.id)));
        }
        let SnapshotValue::Object { class, members } = &root.value else {
            return Err(mismatch("root is not an object"));
        };
        let expected = self.registry.class(self.registry.root()).name().to_string();
        if *class != expected {
            return Err(mismatch(format!("root class {class}, expected {expected}")));
        }
        self.load_members(Ref::ROOT, members)
    }

    fn load_members(&mut self, obj: Ref, members: &[(String, SnapshotNode)]) -> GraphResult<()> {
        let class = self.class_of(obj);
        let registry = Arc::clone(&self.registry);
        let desc = registry.class(class);
        if desc.members().len() != members.len() {
            return Err(mismatch(format!("{} has {} members", desc.name(), members.len())));
        }
        let refs = self.members(obj).to_vec();
        for ((member, r), (name, node)) in desc.members().iter().zip(refs).zip(members) {
            if member.name != *name {
                return Err(mismatch(format!("{}.{name}, expected {}", desc.name(), member.name)));
            }
            if node.id != r {
                return Err(mismatch(format!("{}.{name} has id {:?}, expected {r:?}", desc.name(), node.id)));
            }
            self.load_value(r, &node.value)?;
        }
        Ok(())
    }

    fn load_value(&mut self, r: Ref, value: &SnapshotValue) -> GraphResult<()> {
        let kind = self.kind(r);
        match (kind, value) {
            (MemberKind::Object(class), SnapshotValue::Object { class: name, members }) => {
                if self.registry.class(class).name() != name {
                    return Err(mismatch(format!("embedded {name} at {r:?}")));
                }
                self.load_members(r, members)
            }
            (MemberKind::Array(_), SnapshotValue::Array(elems)) => {
                for (key, node) in elems {
                    self.load_element(r, ContainerKey::Float(key.clone()), node)?;
                }
                Ok(())
            }
            (MemberKind::Collection(_), SnapshotValue::Collection(elems)) => {
                for (key, node) in elems {
                    self.load_element(r, ContainerKey::Random(*key), node)?;
                }
                Ok(())
            }
            (MemberKind::Message, SnapshotValue::Message) => Ok(()),
            (MemberKind::Enum(id), SnapshotValue::Enum(name)) => {
                let index = self
                    .registry
                    .enum_class(id)
                    .index_of(name)
                    .ok_or_else(|| mismatch(format!("enumerator {name} at {r:?}")))?;
                self.try_set_value(r, Value::Enum(index))
            }
            (_, value) => match scalar(value) {
                Some(v) => self.try_set_value(r, v).map_err(|_| mismatch(format!("value kind at {r:?}"))),
                None => Err(mismatch(format!("{} expected at {r:?}", kind.name()))),
            },
        }
    }

    fn load_element(&mut self, container: Ref, key: ContainerKey, node: &SnapshotNode) -> GraphResult<()> {
        let SnapshotValue::Object { class, members } = &node.value else {
            return Err(mismatch(format!("element {:?} is not an object", node.id)));
        };
        let class = self.registry.class_id(class)?;
        self.try_insert_at(container, key, class, node.id)?;
        self.load_members(node.id, members)
    }

    // ------------------------------------------------------------------
    // Fresh copies
    // ------------------------------------------------------------------

    /// Insert a copy of a captured object with fresh refs.
    pub fn insert_copy(
        &mut self,
        container: Ref,
        node: &SnapshotNode,
        position: Position,
    ) -> GraphResult<Ref> {
        let SnapshotValue::Object { class, members } = &node.value else {
            return Err(mismatch("only objects can be inserted"));
        };
        let class: ClassId = self.registry.class_id(class)?;
        let key = self.make_key(container, position);
        let elem = self.allocate(self.registry.class(class).ref_span());
        self.try_insert_at(container, key, class, elem)?;
        self.assign_members(elem, members)?;
        Ok(elem)
    }

    /// Assign captured member values by name. Container members receive
    /// fresh copies of the captured elements, appended at the end.
    pub fn assign_members(&mut self, obj: Ref, members: &[(String, SnapshotNode)]) -> GraphResult<()> {
        for (name, node) in members {
            let r = self.member(obj, name)?;
            match (&node.value, self.kind(r)) {
                (SnapshotValue::Object { members, .. }, MemberKind::Object(_)) => {
                    self.assign_members(r, members)?
                }
                (SnapshotValue::Array(elems), MemberKind::Array(_)) => {
                    for (_, elem) in elems {
                        self.insert_copy(r, elem, Position::End)?;
                    }
                }
                (SnapshotValue::Collection(elems), MemberKind::Collection(_)) => {
                    for (_, elem) in elems {
                        self.insert_copy(r, elem, Position::End)?;
                    }
                }
                (SnapshotValue::Message, MemberKind::Message) => {}
                (SnapshotValue::Enum(e), MemberKind::Enum(id)) => {
                    let index = self
                        .registry
                        .enum_class(id)
                        .index_of(e)
                        .ok_or_else(|| mismatch(format!("enumerator {e}")))?;
                    self.try_set_value(r, Value::Enum(index))?;
                }
                (value, kind) => match scalar(value) {
                    Some(v) => self.try_set_value(r, v)?,
                    None => return Err(mismatch(format!("{name}: {} expected", kind.name()))),
                },
            }
        }
        Ok(())
    }
}

fn scalar(value: &SnapshotValue) -> Option<Value> {
    Some(match value {
        SnapshotValue::Bool(b) => Value::Bool(*b),
        SnapshotValue::Int(i) => Value::Int(*i),
        SnapshotValue::Float(f) => Value::Float(*f),
        SnapshotValue::Blob(b) => Value::Blob(b.clone()),
        SnapshotValue::ObjectRef(r) => Value::ObjectRef(*r),
        _ => return None,
    })
}
