//! Reflection metadata for Weave documents.
//!
//! Every document node type is described by an explicit descriptor: a class
//! name, an optional base class and an ordered list of `(member name, field
//! kind)` pairs. The [`ClassRegistry`] holding them is an ordinary value built
//! once at start-up and shared (behind an `Arc`) with every component that
//! needs type lookup. Two registries never interfere, which keeps tests
//! isolated.

pub mod class;
pub mod error;
pub mod registry;

pub use class::{Class, ClassId, EnumClass, EnumId, FieldKind, Member, MemberKind};
pub use error::{SchemaError, SchemaResult};
pub use registry::{ClassBuilder, ClassRegistry};
