use serde::de::DeserializeOwned;
use serde::Serialize;
use weave_graph::Snapshot;
use weave_tx::Transaction;
use weave_types::TxIdRange;

use crate::error::{CodecError, CodecResult};
use crate::mold::Mold;

fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> CodecResult<T> {
    bincode::deserialize(data).map_err(|e| CodecError::Deserialization(e.to_string()))
}

pub fn encode_tx(tx: &Transaction) -> CodecResult<Vec<u8>> {
    encode(tx)
}

pub fn decode_tx(data: &[u8]) -> CodecResult<Transaction> {
    decode(data)
}

/// Encode a whole-document snapshot.
pub fn encode_backend(snapshot: &Snapshot) -> CodecResult<Vec<u8>> {
    encode(snapshot)
}

pub fn decode_backend(data: &[u8]) -> CodecResult<Snapshot> {
    decode(data)
}

/// Encode a squashed transaction with the range of commits it replaces.
pub fn encode_squash(range: &TxIdRange, tx: &Transaction) -> CodecResult<Vec<u8>> {
    encode(&(range, tx))
}

pub fn decode_squash(data: &[u8]) -> CodecResult<(TxIdRange, Transaction)> {
    decode(data)
}

pub(crate) fn encode_mold(mold: &Mold) -> CodecResult<Vec<u8>> {
    encode(mold)
}

pub(crate) fn decode_mold(data: &[u8]) -> CodecResult<Mold> {
    decode(data)
}

/// Content hash of a snapshot, hex encoded. Replicas holding the same
/// baseline report the same fingerprint.
pub fn fingerprint(snapshot: &Snapshot) -> CodecResult<String> {
    let bytes = encode_backend(snapshot)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}
