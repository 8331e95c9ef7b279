//! The versioned object graph at the heart of a Weave document.
//!
//! Nodes live in an arena keyed by [`Ref`](weave_types::Ref). Every node
//! keeps its committed baseline next to its current state, so the graph can
//! at any time:
//!
//! - [`make`](Graph::make) a [`Transaction`](weave_tx::Transaction) describing the pending diff,
//! - [`synchronize`](Graph::synchronize) the diff into the baseline,
//! - [`revert`](Graph::revert) the diff,
//! - [`execute`](Graph::execute) a transaction forward or backward on top of the current state,
//! - write and load a [`Snapshot`] of the baseline.

pub mod container;
pub mod error;
pub mod execute;
pub mod graph;
pub mod make;
pub mod node;
pub mod snapshot;
pub mod sync;
pub mod value;

pub use error::{GraphError, GraphResult};
pub use execute::ExecMode;
pub use graph::Graph;
pub use node::{ContainerKey, Position, Presence, SlotView};
pub use snapshot::{Snapshot, SnapshotNode, SnapshotValue};
pub use value::Value;

#[cfg(test)]
pub(crate) mod testing;
