use std::fmt;

use serde::{Deserialize, Serialize};

/// Registry-assigned identity of a class. Stable for a given declaration
/// order, so replicas sharing a schema agree on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassId(pub u32);

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnumId(pub u32);

/// Field kind as written in a declaration, naming classes and enums.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    Enum(String),
    Blob,
    ObjectRef(String),
    Object(String),
    Array(String),
    Collection(String),
    Message,
}

impl FieldKind {
    pub fn enumeration(name: &str) -> Self {
        Self::Enum(name.to_string())
    }

    pub fn object_ref(class: &str) -> Self {
        Self::ObjectRef(class.to_string())
    }

    pub fn object(class: &str) -> Self {
        Self::Object(class.to_string())
    }

    pub fn array(class: &str) -> Self {
        Self::Array(class.to_string())
    }

    pub fn collection(class: &str) -> Self {
        Self::Collection(class.to_string())
    }
}

/// Field kind after name resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    Bool,
    Int,
    Float,
    Enum(EnumId),
    Blob,
    ObjectRef(ClassId),
    Object(ClassId),
    Array(ClassId),
    Collection(ClassId),
    Message,
}

impl MemberKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Enum(_) => "enum",
            Self::Blob => "blob",
            Self::ObjectRef(_) => "object_ref",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Collection(_) => "collection",
            Self::Message => "message",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Collection(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub kind: MemberKind,
    /// Whether changes below this member are recorded for undo.
    pub undo: bool,
}

/// Descriptor of a declared class.
#[derive(Clone, Debug)]
pub struct Class {
    pub(crate) id: ClassId,
    pub(crate) name: String,
    pub(crate) base: Option<ClassId>,
    pub(crate) own_start: usize,
    pub(crate) members: Vec<Member>,
    pub(crate) ref_span: u32,
}

impl Class {
    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base(&self) -> Option<ClassId> {
        self.base
    }

    /// All members, inherited ones first, in declaration order.
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Members declared by this class itself.
    pub fn own_members(&self) -> &[Member] {
        &self.members[self.own_start..]
    }

    pub fn member_index(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name == name)
    }

    /// Number of refs an instance occupies: the object itself plus every
    /// flattened member, embedded objects recursively.
    pub fn ref_span(&self) -> u32 {
        self.ref_span
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumClass {
    pub(crate) id: EnumId,
    pub(crate) name: String,
    pub(crate) enumerators: Vec<String>,
}

impl EnumClass {
    pub fn id(&self) -> EnumId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn enumerators(&self) -> &[String] {
        &self.enumerators
    }

    pub fn enumerator(&self, index: i64) -> Option<&str> {
        usize::try_from(index).ok().and_then(|i| self.enumerators.get(i)).map(String::as_str)
    }

    pub fn index_of(&self, enumerator: &str) -> Option<i64> {
        self.enumerators.iter().position(|e| e == enumerator).map(|i| i as i64)
    }
}
