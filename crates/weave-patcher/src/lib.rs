//! A patcher model built on the Weave document engine.
//!
//! A patcher holds boxed objects with typed inlets and outlets, the links
//! between them, and the users currently editing. Everything lives in a
//! [`Graph`](weave_graph::Graph), so edits replicate, undo and squash like
//! any other document change. [`PatcherObserver`] turns document
//! notifications into calls on a [`PatcherListener`], the interface an
//! object runtime would implement. [`PatcherValidator`] lets a server
//! deny edits that would leave a link without both of its objects.

pub mod error;
pub mod factory;
pub mod listener;
pub mod patcher;
pub mod schema;
pub mod validator;

pub use error::{PatcherError, PatcherResult};
pub use factory::{ObjectFactory, ObjectSpec};
pub use listener::{PatcherListener, PatcherObserver};
pub use patcher::{LinkEnds, Patcher};
pub use schema::{patcher_registry, PinKind, SCHEMA_VERSION};
pub use validator::PatcherValidator;
