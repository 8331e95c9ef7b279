use weave_tx::{OpFlags, Opcode, Operation, Transaction};
use weave_types::Ref;

use crate::graph::Graph;
use crate::node::{ContainerKey, MoveLink, Payload, Presence};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Context {
    /// Only pending subtrees are visited.
    Normal,
    /// Inside an element added since the baseline.
    Added,
    /// Inside an element erased since the baseline.
    Removed,
}

/// Opcodes bucketed by the phase they execute in: inserts and assignments
/// first, then moves, then resets and erasures deepest first.
#[derive(Default)]
struct Phases {
    build: Vec<Opcode>,
    moves: Vec<Opcode>,
    teardown: Vec<Opcode>,
}

/// The assignment opcode turning `old` into `new`.
pub(crate) fn set_operation(old: &Value, new: &Value) -> Option<Operation> {
    Some(match (old, new) {
        (Value::Bool(old), Value::Bool(new)) => Operation::BoolSet { old: *old, new: *new },
        (Value::Int(old), Value::Int(new)) => Operation::IntSet { old: *old, new: *new },
        (Value::Float(old), Value::Float(new)) => Operation::FloatSet { old: *old, new: *new },
        (Value::Enum(old), Value::Enum(new)) => Operation::EnumSet { old: *old, new: *new },
        (Value::Blob(old), Value::Blob(new)) => {
            Operation::BlobSet { old: old.clone(), new: new.clone() }
        }
        (Value::ObjectRef(old), Value::ObjectRef(new)) => {
            Operation::ObjectRefSet { old: *old, new: *new }
        }
        _ => return None,
    })
}

fn flags(undo: bool) -> OpFlags {
    if undo {
        OpFlags::HISTORY
    } else {
        OpFlags::NONE
    }
}

impl Graph {
    /// Describe the pending diff as a transaction, without touching state.
    ///
    /// Executing the result forward on a replica holding the baseline
    /// reproduces the current state; executing it backward here returns to
    /// the baseline.
    pub fn make(&self) -> Transaction {
        let mut phases = Phases::default();
        self.make_node(Ref::ROOT, Context::Normal, &mut phases);
        let mut opcodes = phases.build;
        opcodes.append(&mut phases.moves);
        opcodes.append(&mut phases.teardown);
        Transaction::from_opcodes(opcodes)
    }

    fn make_node(&self, r: Ref, ctx: Context, out: &mut Phases) {
        let node = self.node(r);
        if ctx == Context::Normal && node.modifications == 0 {
            return;
        }
        let f = flags(node.undo);
        match &node.payload {
            Payload::Scalar { value, before } => match ctx {
                Context::Normal | Context::Added => {
                    if value != before {
                        if let Some(op) = set_operation(before, value) {
                            out.build.push(Opcode::new(r, f, op));
                        }
                    }
                }
                Context::Removed => {
                    let default = Value::default_for(node.kind);
                    if let Some(default) = default.filter(|d| d != before) {
                        if let Some(op) = set_operation(before, &default) {
                            out.teardown.push(Opcode::new(r, f, op));
                        }
                    }
                }
            },
            Payload::Message { pending } => {
                if ctx != Context::Removed {
                    for data in pending {
                        out.build.push(Opcode::new(
                            r,
                            OpFlags::NONE,
                            Operation::MessagePush { data: data.clone() },
                        ));
                    }
                }
            }
            Payload::Object { members, .. } => {
                for m in members {
                    self.make_node(*m, ctx, out);
                }
            }
            Payload::Container(c) => {
                for (key, slot) in &c.slots {
                    let elem = slot.elem;
                    match ctx {
                        Context::Normal | Context::Added => match (slot.state, &slot.link) {
                            (Presence::Resident, _) => self.make_node(elem, Context::Normal, out),
                            (Presence::Added, None) => {
                                out.build.push(self.insert_op(r, f, key, elem));
                                self.make_node(elem, Context::Added, out);
                            }
                            (Presence::Added, Some(origin)) => {
                                out.moves.push(move_op(r, f, key, origin));
                                self.make_node(elem, Context::Normal, out);
                            }
                            (Presence::Removed, None) => {
                                self.make_node(elem, Context::Removed, out);
                                out.teardown.push(self.erase_op(r, f, key, elem));
                            }
                            (Presence::Removed, Some(_)) => {}
                        },
                        Context::Removed => match (slot.state, &slot.link) {
                            (Presence::Added, None) | (Presence::Removed, Some(_)) => {}
                            (Presence::Resident, _) | (Presence::Removed, None) => {
                                self.make_node(elem, Context::Removed, out);
                                out.teardown.push(self.erase_op(r, f, key, elem));
                            }
                            (Presence::Added, Some(origin)) => {
                                out.moves.push(move_op(r, f, key, origin));
                                self.make_node(elem, Context::Removed, out);
                                out.teardown.push(self.erase_op(r, f, key, elem));
                            }
                        },
                    }
                }
            }
        }
    }

    fn insert_op(&self, container: Ref, f: OpFlags, key: &ContainerKey, elem: Ref) -> Opcode {
        let class = self.class_of(elem);
        let op = match key {
            ContainerKey::Float(key) => Operation::ArrayInsert { key: key.clone(), class, elem },
            ContainerKey::Random(key) => Operation::CollectionInsert { key: *key, class, elem },
        };
        Opcode::new(container, f, op)
    }

    fn erase_op(&self, container: Ref, f: OpFlags, key: &ContainerKey, elem: Ref) -> Opcode {
        let class = self.class_of(elem);
        let op = match key {
            ContainerKey::Float(key) => Operation::ArrayErase { key: key.clone(), class, elem },
            ContainerKey::Random(key) => Operation::CollectionErase { key: *key, class, elem },
        };
        Opcode::new(container, f, op)
    }
}

fn move_op(container: Ref, f: OpFlags, key: &ContainerKey, origin: &MoveLink) -> Opcode {
    let op = match (key, &origin.key) {
        (ContainerKey::Float(key), ContainerKey::Float(src_key)) => Operation::ArrayMove {
            key: key.clone(),
            src: origin.container,
            src_key: src_key.clone(),
        },
        (ContainerKey::Random(key), ContainerKey::Random(src_key)) => {
            Operation::CollectionMove { key: *key, src: origin.container, src_key: *src_key }
        }
        _ => weave_types::fatal!("move between an array and a collection"),
    };
    Opcode::new(container, f, op)
}
