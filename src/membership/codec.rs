//! Wire Protocol Codec
//!
//! Flat little-endian layout, no padding:
//!
//! ```text
//! Message := kind:u32 | sender.id:u32 | sender.port:u16 | Record*
//! Record  := id:u32 | port:u16 | heartbeat:u64 | last_refresh:u64 | failed:u8
//! ```
//!
//! The record count is implied by the payload length.

use super::types::{Address, MemberRecord, Message, MessageKind};
use crate::error::{MembershipError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const HEADER_LEN: usize = 4;
pub const ADDRESS_LEN: usize = 6;
pub const RECORD_LEN: usize = 23;
pub const MIN_MESSAGE_LEN: usize = HEADER_LEN + ADDRESS_LEN;

/// Encodes a message. Records are ignored for `JoinRequest`.
pub fn encode(kind: MessageKind, sender: Address, records: &[MemberRecord]) -> Bytes {
    let body = if kind.carries_table() { records } else { &[] };

    let mut buf = BytesMut::with_capacity(MIN_MESSAGE_LEN + body.len() * RECORD_LEN);
    buf.put_u32_le(kind.to_wire());
    put_address(&mut buf, sender);
    for record in body {
        put_record(&mut buf, record);
    }

    buf.freeze()
}

pub fn decode(mut buf: &[u8]) -> Result<Message> {
    if buf.len() < MIN_MESSAGE_LEN {
        return Err(MembershipError::MalformedMessage(format!(
            "{} bytes is shorter than the {} byte header",
            buf.len(),
            MIN_MESSAGE_LEN
        )));
    }

    let raw_kind = buf.get_u32_le();
    let kind = MessageKind::from_wire(raw_kind)
        .ok_or(MembershipError::UnknownMessageKind(raw_kind))?;
    let sender = get_address(&mut buf);

    if !kind.carries_table() && buf.has_remaining() {
        return Err(MembershipError::MalformedMessage(format!(
            "{:?} carries {} unexpected payload bytes",
            kind,
            buf.remaining()
        )));
    }

    if buf.remaining() % RECORD_LEN != 0 {
        return Err(MembershipError::MalformedMessage(format!(
            "payload of {} bytes is not a whole number of {} byte records",
            buf.remaining(),
            RECORD_LEN
        )));
    }

    let mut records = Vec::with_capacity(buf.remaining() / RECORD_LEN);
    while buf.has_remaining() {
        records.push(get_record(&mut buf)?);
    }

    Ok(Message {
        kind,
        sender,
        records,
    })
}

fn put_address(buf: &mut BytesMut, addr: Address) {
    buf.put_u32_le(addr.id);
    buf.put_u16_le(addr.port);
}

fn get_address(buf: &mut &[u8]) -> Address {
    let id = buf.get_u32_le();
    let port = buf.get_u16_le();
    Address::new(id, port)
}

fn put_record(buf: &mut BytesMut, record: &MemberRecord) {
    buf.put_u32_le(record.id);
    buf.put_u16_le(record.port);
    buf.put_u64_le(record.heartbeat);
    buf.put_u64_le(record.last_refresh);
    buf.put_u8(record.failed as u8);
}

fn get_record(buf: &mut &[u8]) -> Result<MemberRecord> {
    let id = buf.get_u32_le();
    let port = buf.get_u16_le();
    let heartbeat = buf.get_u64_le();
    let last_refresh = buf.get_u64_le();
    let failed = match buf.get_u8() {
        0 => false,
        1 => true,
        other => {
            return Err(MembershipError::MalformedMessage(format!(
                "record {} has failed flag {}",
                id, other
            )));
        }
    };

    Ok(MemberRecord {
        id,
        port,
        heartbeat,
        last_refresh,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_records() -> Vec<MemberRecord> {
        vec![
            MemberRecord {
                id: 1,
                port: 0,
                heartbeat: 41,
                last_refresh: 40,
                failed: false,
            },
            MemberRecord {
                id: 2,
                port: 7,
                heartbeat: 3,
                last_refresh: 12,
                failed: true,
            },
        ]
    }

    #[test]
    fn test_join_request_has_no_records() {
        let bytes = encode(MessageKind::JoinRequest, Address::new(2, 0), &sample_records());
        assert_eq!(bytes.len(), MIN_MESSAGE_LEN);

        let msg = decode(&bytes).unwrap();
        assert_eq!(msg.kind, MessageKind::JoinRequest);
        assert_eq!(msg.sender, Address::new(2, 0));
        assert!(msg.records.is_empty());
    }

    #[test]
    fn test_join_request_with_records_is_rejected() {
        let update = encode(MessageKind::Update, Address::new(2, 0), &sample_records());
        let mut bytes = update.to_vec();
        bytes[0..4].copy_from_slice(&MessageKind::JoinRequest.to_wire().to_le_bytes());

        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, MembershipError::MalformedMessage(_)));

        // a single stray byte too
        let mut short = encode(MessageKind::JoinRequest, Address::new(2, 0), &[]).to_vec();
        short.push(0);
        assert!(matches!(
            decode(&short),
            Err(MembershipError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_layout_is_little_endian_and_packed() {
        let bytes = encode(MessageKind::Update, Address::new(0x0102_0304, 0x0506), &sample_records()[..1]);

        assert_eq!(bytes.len(), MIN_MESSAGE_LEN + RECORD_LEN);
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[4..10], &[0x04, 0x03, 0x02, 0x01, 0x06, 0x05]);
        // heartbeat 41 starts after id + port of the record
        assert_eq!(bytes[MIN_MESSAGE_LEN + 6], 41);
        assert_eq!(bytes[bytes.len() - 1], 0);
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let err = decode(&[0u8; MIN_MESSAGE_LEN - 1]).unwrap_err();
        assert!(matches!(err, MembershipError::MalformedMessage(_)));
    }

    #[test]
    fn test_partial_record_is_malformed() {
        let bytes = encode(MessageKind::Update, Address::new(1, 0), &sample_records());
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, MembershipError::MalformedMessage(_)));
    }

    #[test]
    fn test_unknown_kind() {
        let mut bytes = encode(MessageKind::Update, Address::new(1, 0), &[]).to_vec();
        bytes[0] = 9;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, MembershipError::UnknownMessageKind(9)));
    }

    #[test]
    fn test_bad_failed_flag_is_malformed() {
        let mut bytes = encode(MessageKind::JoinReply, Address::new(1, 0), &sample_records()[..1]).to_vec();
        let last = bytes.len() - 1;
        bytes[last] = 2;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, MembershipError::MalformedMessage(_)));
    }

    fn arb_record() -> impl Strategy<Value = MemberRecord> {
        (any::<u32>(), any::<u16>(), any::<u64>(), any::<u64>(), any::<bool>()).prop_map(
            |(id, port, heartbeat, last_refresh, failed)| MemberRecord {
                id,
                port,
                heartbeat,
                last_refresh,
                failed,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_table_messages_round_trip(
            id in any::<u32>(),
            port in any::<u16>(),
            reply in any::<bool>(),
            records in proptest::collection::vec(arb_record(), 0..32),
        ) {
            let kind = if reply { MessageKind::JoinReply } else { MessageKind::Update };
            let bytes = encode(kind, Address::new(id, port), &records);

            prop_assert_eq!(bytes.len(), MIN_MESSAGE_LEN + records.len() * RECORD_LEN);

            let msg = decode(&bytes).unwrap();
            prop_assert_eq!(msg.kind, kind);
            prop_assert_eq!(msg.sender, Address::new(id, port));
            prop_assert_eq!(msg.records, records);
        }
    }
}
