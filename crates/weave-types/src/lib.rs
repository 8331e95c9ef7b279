//! Foundation types for the Weave document engine.
//!
//! Every other Weave crate depends on `weave-types`. It provides the identity
//! and ordering primitives that survive serialization and replication:
//!
//! - [`Ref`]: document-scoped identity of a graph node (actor + counter)
//! - [`KeyFloat`]: growable fractional key ordering array elements
//! - [`KeyRandom`]: opaque random key for collection elements
//! - [`TxId`] / [`TxIdRange`]: transaction identity and squash ranges
//! - [`FourCc`]: four-character codes for wire messages and file tags
//! - [`fatal!`]: the contract-violation policy shared by the engine

pub mod error;
pub mod fatal;
pub mod fourcc;
pub mod key_float;
pub mod key_random;
pub mod reference;
pub mod tx_id;

pub use error::TypeError;
pub use fourcc::FourCc;
pub use key_float::KeyFloat;
pub use key_random::KeyRandom;
pub use reference::Ref;
pub use tx_id::{TxId, TxIdRange};

#[doc(hidden)]
pub use tracing as __tracing;
