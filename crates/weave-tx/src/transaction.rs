use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weave_types::TxId;

use crate::opcode::{OpFlags, Opcode};

/// Execution direction of a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

const LABEL_KEY: &str = "label";

/// Ordered list of opcodes plus identity and free-form metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    id: TxId,
    metadata: BTreeMap<String, String>,
    opcodes: Vec<Opcode>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_opcodes(opcodes: Vec<Opcode>) -> Self {
        Self { opcodes, ..Self::default() }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn set_id(&mut self, id: TxId) {
        self.id = id;
    }

    /// Undo label, if one was attached.
    pub fn label(&self) -> Option<&str> {
        self.metadata.get(LABEL_KEY).map(String::as_str)
    }

    pub fn set_label(&mut self, label: &str) {
        if label.is_empty() {
            self.metadata.remove(LABEL_KEY);
        } else {
            self.metadata.insert(LABEL_KEY.to_string(), label.to_string());
        }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn set_metadata(&mut self, key: &str, value: &str) {
        self.metadata.insert(key.to_string(), value.to_string());
    }

    pub fn opcodes(&self) -> &[Opcode] {
        &self.opcodes
    }

    pub fn into_opcodes(self) -> Vec<Opcode> {
        self.opcodes
    }

    pub fn push(&mut self, opcode: Opcode) {
        self.opcodes.push(opcode);
    }

    /// Concatenate another transaction's opcodes after ours.
    pub fn append(&mut self, other: Transaction) {
        self.opcodes.extend(other.opcodes);
    }

    pub fn is_empty(&self) -> bool {
        self.opcodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.opcodes.len()
    }

    pub fn clear(&mut self) {
        self.opcodes.clear();
    }

    /// Whether undoing this transaction would change anything.
    pub fn has_opcode_in_undo(&self) -> bool {
        self.opcodes
            .iter()
            .any(|o| o.flags.contains(OpFlags::UNDO) && o.inverted().is_some())
    }

    /// The transaction that undoes this one: reversed order, each opcode
    /// inverted. Identity and metadata are kept.
    pub fn inverted(&self) -> Transaction {
        Transaction {
            id: self.id,
            metadata: self.metadata.clone(),
            opcodes: self.opcodes.iter().rev().filter_map(Opcode::inverted).collect(),
        }
    }
}
