use std::fmt;

use serde::{Deserialize, Serialize};
use weave_schema::ClassId;
use weave_types::{KeyFloat, KeyRandom, Ref};

/// Wire numbering of operation kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    BoolSet = 0,
    IntSet,
    FloatSet,
    EnumSet,
    ObjectRefSet,
    BlobSet,
    CollectionInsert,
    CollectionErase,
    CollectionMove,
    ArrayInsert,
    ArrayErase,
    ArrayMove,
    MessagePush,
}

/// Per-opcode execution flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpFlags(u8);

impl OpFlags {
    pub const NONE: OpFlags = OpFlags(0);
    /// Replayed when undoing.
    pub const UNDO: OpFlags = OpFlags(1);
    /// Replayed when redoing.
    pub const REDO: OpFlags = OpFlags(1 << 1);
    /// Applied without checking the current value against `old`.
    pub const FORCED: OpFlags = OpFlags(1 << 2);
    pub const HISTORY: OpFlags = OpFlags(Self::UNDO.0 | Self::REDO.0);

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: OpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: OpFlags) -> OpFlags {
        OpFlags(self.0 | other.0)
    }

    pub const fn without(self, other: OpFlags) -> OpFlags {
        OpFlags(self.0 & !other.0)
    }
}

impl Default for OpFlags {
    fn default() -> Self {
        Self::HISTORY
    }
}

impl fmt::Debug for OpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Self::UNDO) {
            parts.push("UNDO");
        }
        if self.contains(Self::REDO) {
            parts.push("REDO");
        }
        if self.contains(Self::FORCED) {
            parts.push("FORCED");
        }
        write!(f, "OpFlags({})", parts.join("|"))
    }
}

/// The change an opcode performs on its target.
///
/// Container operations target the container; `elem` is the element's ref
/// and `class` its concrete class, so a replica can rebuild the element with
/// identical refs. Moves target the destination container and name the
/// source container and key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    BoolSet { old: bool, new: bool },
    IntSet { old: i64, new: i64 },
    FloatSet { old: f64, new: f64 },
    EnumSet { old: i64, new: i64 },
    ObjectRefSet { old: Ref, new: Ref },
    BlobSet { old: Vec<u8>, new: Vec<u8> },
    CollectionInsert { key: KeyRandom, class: ClassId, elem: Ref },
    CollectionErase { key: KeyRandom, class: ClassId, elem: Ref },
    CollectionMove { key: KeyRandom, src: Ref, src_key: KeyRandom },
    ArrayInsert { key: KeyFloat, class: ClassId, elem: Ref },
    ArrayErase { key: KeyFloat, class: ClassId, elem: Ref },
    ArrayMove { key: KeyFloat, src: Ref, src_key: KeyFloat },
    MessagePush { data: Vec<u8> },
}

impl Operation {
    pub fn code(&self) -> OpCode {
        match self {
            Self::BoolSet { .. } => OpCode::BoolSet,
            Self::IntSet { .. } => OpCode::IntSet,
            Self::FloatSet { .. } => OpCode::FloatSet,
            Self::EnumSet { .. } => OpCode::EnumSet,
            Self::ObjectRefSet { .. } => OpCode::ObjectRefSet,
            Self::BlobSet { .. } => OpCode::BlobSet,
            Self::CollectionInsert { .. } => OpCode::CollectionInsert,
            Self::CollectionErase { .. } => OpCode::CollectionErase,
            Self::CollectionMove { .. } => OpCode::CollectionMove,
            Self::ArrayInsert { .. } => OpCode::ArrayInsert,
            Self::ArrayErase { .. } => OpCode::ArrayErase,
            Self::ArrayMove { .. } => OpCode::ArrayMove,
            Self::MessagePush { .. } => OpCode::MessagePush,
        }
    }

    pub fn is_structural(&self) -> bool {
        !matches!(
            self.code(),
            OpCode::BoolSet
                | OpCode::IntSet
                | OpCode::FloatSet
                | OpCode::EnumSet
                | OpCode::ObjectRefSet
                | OpCode::BlobSet
                | OpCode::MessagePush
        )
    }
}

/// One primitive change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Opcode {
    pub target: Ref,
    pub flags: OpFlags,
    pub op: Operation,
}

impl Opcode {
    pub fn new(target: Ref, flags: OpFlags, op: Operation) -> Self {
        Self { target, flags, op }
    }

    /// The opcode undoing this one. Message pushes have no inverse.
    pub fn inverted(&self) -> Option<Opcode> {
        use Operation::*;
        let (target, op) = match &self.op {
            BoolSet { old, new } => (self.target, BoolSet { old: *new, new: *old }),
            IntSet { old, new } => (self.target, IntSet { old: *new, new: *old }),
            FloatSet { old, new } => (self.target, FloatSet { old: *new, new: *old }),
            EnumSet { old, new } => (self.target, EnumSet { old: *new, new: *old }),
            ObjectRefSet { old, new } => (self.target, ObjectRefSet { old: *new, new: *old }),
            BlobSet { old, new } => (self.target, BlobSet { old: new.clone(), new: old.clone() }),
            CollectionInsert { key, class, elem } => {
                (self.target, CollectionErase { key: *key, class: *class, elem: *elem })
            }
            CollectionErase { key, class, elem } => {
                (self.target, CollectionInsert { key: *key, class: *class, elem: *elem })
            }
            CollectionMove { key, src, src_key } => {
                (*src, CollectionMove { key: *src_key, src: self.target, src_key: *key })
            }
            ArrayInsert { key, class, elem } => {
                (self.target, ArrayErase { key: key.clone(), class: *class, elem: *elem })
            }
            ArrayErase { key, class, elem } => {
                (self.target, ArrayInsert { key: key.clone(), class: *class, elem: *elem })
            }
            ArrayMove { key, src, src_key } => (
                *src,
                ArrayMove { key: src_key.clone(), src: self.target, src_key: key.clone() },
            ),
            MessagePush { .. } => return None,
        };
        Some(Opcode { target, flags: self.flags, op })
    }
}
