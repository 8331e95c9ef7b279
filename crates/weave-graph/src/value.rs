use std::fmt;

use weave_schema::MemberKind;
use weave_types::Ref;

/// Current or baseline content of a scalar cell.
#[derive(Clone, Debug)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Enumerator index.
    Enum(i64),
    Blob(Vec<u8>),
    ObjectRef(Ref),
}

impl Value {
    /// Default value of a scalar member kind, `None` for structural kinds.
    pub fn default_for(kind: MemberKind) -> Option<Value> {
        Some(match kind {
            MemberKind::Bool => Value::Bool(false),
            MemberKind::Int => Value::Int(0),
            MemberKind::Float => Value::Float(0.0),
            MemberKind::Enum(_) => Value::Enum(0),
            MemberKind::Blob => Value::Blob(Vec::new()),
            MemberKind::ObjectRef(_) => Value::ObjectRef(Ref::NULL),
            MemberKind::Object(_)
            | MemberKind::Array(_)
            | MemberKind::Collection(_)
            | MemberKind::Message => return None,
        })
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Enum(_) => "enum",
            Value::Blob(_) => "blob",
            Value::ObjectRef(_) => "object_ref",
        }
    }

    pub fn same_kind(&self, other: &Value) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) | Value::Enum(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_object_ref(&self) -> Option<Ref> {
        match self {
            Value::ObjectRef(v) => Some(*v),
            _ => None,
        }
    }
}

// Floats compare bitwise so that writing the same value is always a no-op.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Blob(a), Value::Blob(b)) => a == b,
            (Value::ObjectRef(a), Value::ObjectRef(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Enum(v) => write!(f, "#{v}"),
            Value::Blob(v) => match std::str::from_utf8(v) {
                Ok(s) => write!(f, "{s:?}"),
                Err(_) => write!(f, "<{} bytes>", v.len()),
            },
            Value::ObjectRef(r) => write!(f, "{r:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_exist_for_scalars_only() {
        assert_eq!(Value::default_for(MemberKind::Int), Some(Value::Int(0)));
        assert_eq!(Value::default_for(MemberKind::Message), None);
    }

    #[test]
    fn nan_equals_itself() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
    }

    #[test]
    fn kinds_do_not_compare_equal() {
        assert_ne!(Value::Int(1), Value::Enum(1));
        assert!(!Value::Int(1).same_kind(&Value::Enum(1)));
    }

    #[test]
    fn display_blob_as_string() {
        assert_eq!(Value::Blob(b"plus".to_vec()).to_string(), "\"plus\"");
    }
}
