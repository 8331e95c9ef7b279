//! The Weave document engine.
//!
//! A [`Document`] owns a versioned [`Graph`](weave_graph::Graph) and runs its
//! commit / push / pull cycle against a [`Carrier`]. Local edits accumulate as
//! a pending diff; [`commit`](Document::commit) turns them into a transaction,
//! notifies the [`DocumentObserver`] and queues the transaction until the
//! server acknowledges it. [`pull`](Document::pull) merges remote
//! transactions under the local pending diff.
//!
//! [`DocumentManager`] adds what an editing session needs on top: undo
//! history, commit gestures, connection bring-up and periodic pulling.
//! [`DocumentValidator`] is the semantic check a server applies on top of
//! strict execution.

pub mod carrier;
pub mod config;
pub mod document;
pub mod error;
pub mod gesture;
pub mod manager;
pub mod observer;
pub mod validator;

pub use carrier::{Carrier, CarrierState};
pub use config::EngineConfig;
pub use document::Document;
pub use error::{DocumentError, DocumentResult};
pub use gesture::PendingGesture;
pub use manager::DocumentManager;
pub use observer::DocumentObserver;
pub use validator::{DocumentValidator, Rejection};

#[cfg(test)]
pub(crate) mod testing;
