use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use weave_graph::Snapshot;
use weave_tx::Transaction;
use weave_types::{FourCc, Ref, TxId, TxIdRange};

pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Messages exchanged between a document and its server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// First message of a session, client to server.
    Greet { user: u64, session: u64, metadata: BTreeMap<String, String> },
    /// Full document, server to client, in reply to a greet.
    Backend { snapshot: Snapshot },
    /// A committed transaction: client to server, then relayed to peers.
    Tx { tx: Transaction },
    /// The server accepted the transaction or squash ending at `id`.
    Ack { id: TxId },
    /// The server rejected it; the sender rolls it back.
    Deny { id: TxId },
    /// Applied by the receiver as its own local edit.
    Local { tx: Transaction },
    /// Several unacknowledged commits replaced by their net effect.
    Squash { range: TxIdRange, tx: Transaction },
    /// Transient notification relayed to the other peers, never stored.
    Signal { kind: FourCc, target: Ref, payload: Vec<u8> },
}

impl WireMessage {
    pub fn type_tag(&self) -> FourCc {
        match self {
            Self::Greet { .. } => FourCc::new(b"helo"),
            Self::Backend { .. } => FourCc::new(b"bbin"),
            Self::Tx { .. } => FourCc::new(b"tx  "),
            Self::Ack { .. } => FourCc::new(b"txak"),
            Self::Deny { .. } => FourCc::new(b"txdn"),
            Self::Local { .. } => FourCc::new(b"locl"),
            Self::Squash { .. } => FourCc::new(b"sqsh"),
            Self::Signal { .. } => FourCc::new(b"sig "),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Greet { .. } => "Greet",
            Self::Backend { .. } => "Backend",
            Self::Tx { .. } => "Tx",
            Self::Ack { .. } => "Ack",
            Self::Deny { .. } => "Deny",
            Self::Local { .. } => "Local",
            Self::Squash { .. } => "Squash",
            Self::Signal { .. } => "Signal",
        }
    }

    /// Whether `tag` names a known message type.
    pub fn is_known_tag(tag: FourCc) -> bool {
        matches!(tag.as_bytes(), b"helo" | b"bbin" | b"tx  " | b"txak" | b"txdn" | b"locl" | b"sqsh" | b"sig ")
    }
}
