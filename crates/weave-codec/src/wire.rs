use bytes::{BufMut, BytesMut};
use weave_types::FourCc;

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{WireMessage, MAX_MESSAGE_SIZE};

/// Length of the frame header: 4 bytes length, 4 bytes type tag.
const HEADER_SIZE: usize = 8;

/// Codec for framing wire messages.
pub struct WireCodec;

impl WireCodec {
    /// Encode a message with framing: [4 bytes len][4 bytes tag][payload].
    /// The length counts the tag and the payload.
    pub fn encode(msg: &WireMessage) -> ProtocolResult<Vec<u8>> {
        let payload =
            bincode::serialize(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge { size: payload.len(), max: MAX_MESSAGE_SIZE });
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.put_u32((payload.len() + 4) as u32);
        buf.put_slice(msg.type_tag().as_bytes());
        buf.put_slice(&payload);
        Ok(buf)
    }

    /// Decode one framed message. Returns (message, bytes_consumed).
    pub fn decode(data: &[u8]) -> ProtocolResult<(WireMessage, usize)> {
        if data.len() < HEADER_SIZE {
            return Err(ProtocolError::FramingError("too short".into()));
        }
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if len < 4 {
            return Err(ProtocolError::FramingError(format!("frame length {len}")));
        }
        if len - 4 > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge { size: len - 4, max: MAX_MESSAGE_SIZE });
        }
        let total = 4 + len;
        if data.len() < total {
            return Err(ProtocolError::FramingError(format!(
                "incomplete: have {}, need {}",
                data.len(),
                total
            )));
        }
        let mut tag = [0u8; 4];
        tag.copy_from_slice(&data[4..8]);
        let tag = FourCc::new(&tag);
        if !WireMessage::is_known_tag(tag) {
            return Err(ProtocolError::InvalidMessageType(tag));
        }
        let msg: WireMessage = bincode::deserialize(&data[HEADER_SIZE..total])
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        if msg.type_tag() != tag {
            return Err(ProtocolError::TagMismatch { tag, found: msg.type_tag() });
        }
        Ok((msg, total))
    }

    /// Take the next complete frame off a stream buffer, if one is buffered.
    pub fn decode_from(buf: &mut BytesMut) -> ProtocolResult<Option<WireMessage>> {
        if buf.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len.saturating_sub(4) > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge { size: len - 4, max: MAX_MESSAGE_SIZE });
        }
        if buf.len() < 4 + len {
            return Ok(None);
        }
        let frame = buf.split_to(4 + len);
        let (msg, _) = Self::decode(&frame)?;
        Ok(Some(msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weave_tx::{OpFlags, Opcode, Operation, Transaction};
    use weave_types::{Ref, TxId, TxIdRange};

    fn tx() -> Transaction {
        let mut tx = Transaction::from_opcodes(vec![Opcode::new(
            Ref::new(0, 3),
            OpFlags::HISTORY,
            Operation::IntSet { old: 1, new: 2 },
        )]);
        tx.set_id(TxId::new(5, 2, 9));
        tx
    }

    macro_rules! roundtrip_test {
        ($name:ident, $msg:expr) => {
            #[test]
            fn $name() {
                let msg = $msg;
                let encoded = WireCodec::encode(&msg).unwrap();
                let (decoded, consumed) = WireCodec::decode(&encoded).unwrap();
                assert_eq!(consumed, encoded.len());
                assert_eq!(&encoded[4..8], msg.type_tag().as_bytes());
                assert_eq!(decoded, msg);
            }
        };
    }

    roundtrip_test!(greet_roundtrip, WireMessage::Greet {
        user: 5,
        session: 77,
        metadata: BTreeMap::from([("name".to_string(), "ada".to_string())]),
    });

    roundtrip_test!(tx_roundtrip, WireMessage::Tx { tx: tx() });

    roundtrip_test!(ack_roundtrip, WireMessage::Ack { id: TxId::new(5, 2, 9) });

    roundtrip_test!(deny_roundtrip, WireMessage::Deny { id: TxId::new(5, 2, 9) });

    roundtrip_test!(local_roundtrip, WireMessage::Local { tx: tx() });

    roundtrip_test!(squash_roundtrip, WireMessage::Squash {
        range: TxIdRange { first: TxId::new(5, 2, 3), last: TxId::new(5, 2, 9) },
        tx: tx(),
    });

    roundtrip_test!(signal_roundtrip, WireMessage::Signal {
        kind: FourCc::new(b"ping"),
        target: Ref::ROOT,
        payload: vec![1, 2, 3],
    });

    #[test]
    fn type_tags_unique() {
        let msgs = vec![
            WireMessage::Greet { user: 0, session: 0, metadata: BTreeMap::new() },
            WireMessage::Tx { tx: Transaction::new() },
            WireMessage::Ack { id: TxId::default() },
            WireMessage::Deny { id: TxId::default() },
            WireMessage::Local { tx: Transaction::new() },
            WireMessage::Squash { range: TxIdRange::single(TxId::default()), tx: Transaction::new() },
            WireMessage::Signal { kind: FourCc::new(b"ping"), target: Ref::NULL, payload: vec![] },
        ];
        let mut tags: Vec<FourCc> = msgs.iter().map(|m| m.type_tag()).collect();
        assert!(tags.iter().all(|t| WireMessage::is_known_tag(*t)));
        let len = tags.len();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), len, "type tags should be unique");
    }

    #[test]
    fn type_names_correct() {
        assert_eq!(WireMessage::Ack { id: TxId::default() }.type_name(), "Ack");
        assert_eq!(WireMessage::Tx { tx: Transaction::new() }.type_name(), "Tx");
    }

    #[test]
    fn decode_truncated() {
        let err = WireCodec::decode(&[0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::FramingError(_)));
    }

    #[test]
    fn decode_unknown_tag() {
        let mut frame = WireCodec::encode(&WireMessage::Ack { id: TxId::default() }).unwrap();
        frame[4..8].copy_from_slice(b"zzzz");
        let err = WireCodec::decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessageType(_)));
    }

    #[test]
    fn decode_mislabelled_frame() {
        let mut frame = WireCodec::encode(&WireMessage::Ack { id: TxId::default() }).unwrap();
        frame[4..8].copy_from_slice(b"txdn");
        let err = WireCodec::decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::TagMismatch { .. }));
    }

    #[test]
    fn decode_garbage_payload() {
        let mut frame = vec![0, 0, 0, 6];
        frame.extend_from_slice(b"tx  ");
        frame.extend_from_slice(&[0xff, 0xff]);
        let err = WireCodec::decode(&frame).unwrap_err();
        assert!(matches!(err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn stream_decoding_waits_for_complete_frames() {
        let a = WireCodec::encode(&WireMessage::Ack { id: TxId::new(1, 1, 1) }).unwrap();
        let b = WireCodec::encode(&WireMessage::Deny { id: TxId::new(1, 1, 2) }).unwrap();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&a[..5]);
        assert!(WireCodec::decode_from(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&a[5..]);
        buf.extend_from_slice(&b);
        assert_eq!(WireCodec::decode_from(&mut buf).unwrap(), Some(WireMessage::Ack { id: TxId::new(1, 1, 1) }));
        assert_eq!(WireCodec::decode_from(&mut buf).unwrap(), Some(WireMessage::Deny { id: TxId::new(1, 1, 2) }));
        assert!(buf.is_empty());
    }
}
