//! Binary encodings used by Weave.
//!
//! - [`binary`]: bincode encodings of transactions, snapshots and squash ranges
//! - [`file`]: the tagged, checksummed snapshot file format
//! - [`mold`]: per-class captures of an object for copy and paste
//! - [`message`] / [`wire`]: four-character-code tagged wire messages and their framing

pub mod binary;
pub mod error;
pub mod file;
pub mod message;
pub mod mold;
pub mod wire;

pub use binary::{
    decode_backend, decode_squash, decode_tx, encode_backend, encode_squash, encode_tx, fingerprint,
};
pub use error::{CodecError, CodecResult, ProtocolError, ProtocolResult, SnapshotError, SnapshotResult};
pub use file::SnapshotFile;
pub use message::WireMessage;
pub use mold::Mold;
pub use wire::WireCodec;
