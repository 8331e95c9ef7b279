use tracing::{debug, warn};
use weave_schema::ClassId;
use weave_tx::{Direction, OpFlags, Opcode, Operation, Transaction};
use weave_types::Ref;

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{ContainerKey, Payload, Presence};
use crate::value::Value;

/// How the executor reacts to opcodes that do not apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecMode {
    /// Fail on the first opcode that does not apply.
    Strict,
    /// Skip opcodes that do not apply.
    Correct,
    /// Skip what does not apply, ignore stale before-values and re-key
    /// inserts and moves that lost a key race.
    Rebase,
}

/// Before and after values of an assignment opcode.
fn assignment(op: &Operation) -> Option<(Value, Value)> {
    Some(match op {
        Operation::BoolSet { old, new } => (Value::Bool(*old), Value::Bool(*new)),
        Operation::IntSet { old, new } => (Value::Int(*old), Value::Int(*new)),
        Operation::FloatSet { old, new } => (Value::Float(*old), Value::Float(*new)),
        Operation::EnumSet { old, new } => (Value::Enum(*old), Value::Enum(*new)),
        Operation::ObjectRefSet { old, new } => (Value::ObjectRef(*old), Value::ObjectRef(*new)),
        Operation::BlobSet { old, new } => (Value::Blob(old.clone()), Value::Blob(new.clone())),
        _ => return None,
    })
}

impl Graph {
    /// Apply `tx` in `direction` on top of the current state.
    ///
    /// Backward execution runs the inverse of each opcode in reverse order.
    /// With `undo_mode` only opcodes flagged for history take part. Returns
    /// the opcodes that were applied, in the transaction's own orientation
    /// and order, with its id and metadata.
    pub fn execute(
        &mut self,
        tx: &Transaction,
        direction: Direction,
        mode: ExecMode,
        undo_mode: bool,
    ) -> GraphResult<Transaction> {
        let required = match direction {
            Direction::Forward => OpFlags::REDO,
            Direction::Backward => OpFlags::UNDO,
        };
        let mut executed = Vec::with_capacity(tx.len());
        let ordered: Box<dyn Iterator<Item = &Opcode>> = match direction {
            Direction::Forward => Box::new(tx.opcodes().iter()),
            Direction::Backward => Box::new(tx.opcodes().iter().rev()),
        };
        for original in ordered {
            if undo_mode && !original.flags.contains(required) {
                continue;
            }
            let applied = match direction {
                Direction::Forward => original.clone(),
                Direction::Backward => match original.inverted() {
                    Some(inverse) => inverse,
                    None => continue,
                },
            };
            match self.apply(&applied, mode) {
                Ok(()) => executed.push(original.clone()),
                Err(e) if mode == ExecMode::Strict => {
                    debug!(node = %applied.target, code = ?applied.op.code(), error = %e, "opcode rejected");
                    return Err(e);
                }
                Err(e) => {
                    warn!(node = %applied.target, code = ?applied.op.code(), error = %e, "skipping opcode");
                }
            }
        }
        if direction == Direction::Backward {
            executed.reverse();
        }
        let mut result = Transaction::from_opcodes(executed);
        result.set_id(tx.id());
        for (key, value) in tx.metadata() {
            result.set_metadata(key, value);
        }
        Ok(result)
    }

    fn apply(&mut self, opcode: &Opcode, mode: ExecMode) -> GraphResult<()> {
        let target = opcode.target;
        if let Some((old, new)) = assignment(&opcode.op) {
            return self.apply_assignment(target, opcode.flags, old, new, mode);
        }
        match &opcode.op {
            Operation::ArrayInsert { key, class, elem } => {
                self.apply_insert(target, ContainerKey::Float(key.clone()), *class, *elem, mode)
            }
            Operation::CollectionInsert { key, class, elem } => {
                self.apply_insert(target, ContainerKey::Random(*key), *class, *elem, mode)
            }
            Operation::ArrayErase { key, elem, .. } => {
                self.apply_erase(target, &ContainerKey::Float(key.clone()), *elem)
            }
            Operation::CollectionErase { key, elem, .. } => {
                self.apply_erase(target, &ContainerKey::Random(*key), *elem)
            }
            Operation::ArrayMove { key, src, src_key } => self.apply_move(
                target,
                ContainerKey::Float(key.clone()),
                *src,
                &ContainerKey::Float(src_key.clone()),
                mode,
            ),
            Operation::CollectionMove { key, src, src_key } => self.apply_move(
                target,
                ContainerKey::Random(*key),
                *src,
                &ContainerKey::Random(*src_key),
                mode,
            ),
            Operation::MessagePush { data } => self.try_send_message(target, data.clone()),
            _ => Err(GraphError::KindMismatch { node: target, expected: "value cell" }),
        }
    }

    fn apply_assignment(
        &mut self,
        target: Ref,
        flags: OpFlags,
        old: Value,
        new: Value,
        mode: ExecMode,
    ) -> GraphResult<()> {
        let node = self.try_node(target)?;
        if node.presence == Presence::Removed {
            return Err(GraphError::RemovedNode(target));
        }
        let Payload::Scalar { value: current, .. } = &node.payload else {
            return Err(GraphError::KindMismatch { node: target, expected: "value cell" });
        };
        if !current.same_kind(&new) {
            return Err(GraphError::KindMismatch { node: target, expected: current.kind_name() });
        }
        let checked = mode != ExecMode::Rebase && !flags.contains(OpFlags::FORCED);
        if checked && *current != old {
            return Err(GraphError::ValueMismatch(target));
        }
        self.try_set_value(target, new)
    }

    fn apply_insert(
        &mut self,
        container: Ref,
        key: ContainerKey,
        class: ClassId,
        elem: Ref,
        mode: ExecMode,
    ) -> GraphResult<()> {
        let existing = self
            .try_container(container)?
            .slots
            .get(&key)
            .map(|s| (s.elem, s.state, s.link.is_some()));
        let key = match existing {
            None => key,
            Some((e, Presence::Removed, false)) if e == elem => {
                return self.try_revive(container, &key, elem);
            }
            Some(_) if mode == ExecMode::Rebase => {
                let rekeyed = self.key_after(container, &key);
                debug!(%container, %elem, "insert re-keyed after collision");
                rekeyed
            }
            Some(_) => return Err(GraphError::KeyOccupied(container)),
        };
        self.try_insert_at(container, key, class, elem)
    }

    fn apply_erase(&mut self, container: Ref, key: &ContainerKey, elem: Ref) -> GraphResult<()> {
        let live = self
            .try_container(container)?
            .slots
            .get(key)
            .is_some_and(|s| s.elem == elem && s.state != Presence::Removed);
        if !live {
            return Err(GraphError::MissingElement { container, elem });
        }
        self.try_erase(elem)
    }

    fn apply_move(
        &mut self,
        dst: Ref,
        key: ContainerKey,
        src: Ref,
        src_key: &ContainerKey,
        mode: ExecMode,
    ) -> GraphResult<()> {
        let elem = match self.try_container(src)?.slots.get(src_key) {
            Some(s) if s.state != Presence::Removed => s.elem,
            _ => return Err(GraphError::MissingElement { container: src, elem: Ref::NULL }),
        };
        match self.try_move_to(elem, dst, key.clone()) {
            Err(GraphError::KeyOccupied(_)) if mode == ExecMode::Rebase => {
                let rekeyed = self.key_after(dst, &key);
                debug!(%dst, %elem, "move re-keyed after collision");
                self.try_move_to(elem, dst, rekeyed)
            }
            other => other,
        }
    }
}
