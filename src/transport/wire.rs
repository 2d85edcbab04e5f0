//! Fixed-size frame codec used by [`StreamTransport`](super::StreamTransport).
//!
//! Every message occupies exactly [`FRAME_LEN`] bytes, little-endian:
//!
//! | Offset | Size | Field       |
//! |--------|------|-------------|
//! | 0      | 1    | type        |
//! | 1      | 1    | req_id      |
//! | 2      | 1    | len         |
//! | 3      | 1    | reserved    |
//! | 4      | 4    | data        |
//! | 8      | 8    | addr        |
//! | 16     | 8    | timestamp   |
//!
//! Frames with an unknown type code, an unknown request id, or a length
//! above four bytes decode to [`MessageKind::Unsupported`].

use crate::message::{Message, MessageKind, Payload, MAX_PAYLOAD};
use crate::types::RequestId;

/// Size of one encoded frame in bytes.
pub const FRAME_LEN: usize = 24;

/// Type code of a read request.
pub const TYPE_READ: u8 = 0x01;
/// Type code of a posted write.
pub const TYPE_WRITE_POSTED: u8 = 0x02;
/// Type code of a read completion.
pub const TYPE_READ_COMP: u8 = 0x03;
/// Type code of a write completion.
pub const TYPE_WRITE_COMP: u8 = 0x04;
/// Type code of a sync marker.
pub const TYPE_SYNC: u8 = 0x40;

/// Encodes `msg` into one frame.
///
/// `Unsupported` messages are encoded with their raw type code and zeroed
/// fields.
pub fn encode(msg: &Message) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    let (ty, req_id, len, data, addr) = match &msg.kind {
        MessageKind::ReadRequest { addr, req_id, len } => {
            (TYPE_READ, req_id.code(), *len, [0u8; MAX_PAYLOAD], *addr)
        }
        MessageKind::WritePosted { addr, req_id, data } => {
            (TYPE_WRITE_POSTED, req_id.code(), data.len(), data.raw(), *addr)
        }
        MessageKind::ReadCompletion { req_id, data } => {
            (TYPE_READ_COMP, req_id.code(), data.len(), data.raw(), 0)
        }
        MessageKind::WriteCompletion { req_id } => {
            (TYPE_WRITE_COMP, req_id.code(), 0, [0u8; MAX_PAYLOAD], 0)
        }
        MessageKind::Sync => (TYPE_SYNC, 0, 0, [0u8; MAX_PAYLOAD], 0),
        MessageKind::Unsupported { msg_type } => (*msg_type, 0, 0, [0u8; MAX_PAYLOAD], 0),
    };

    frame[0] = ty;
    frame[1] = req_id;
    frame[2] = len;
    frame[4..8].copy_from_slice(&data);
    frame[8..16].copy_from_slice(&addr.to_le_bytes());
    frame[16..24].copy_from_slice(&msg.time.to_le_bytes());
    frame
}

/// Decodes one frame.
pub fn decode(frame: &[u8; FRAME_LEN]) -> Message {
    let ty = frame[0];
    let len = frame[2];
    let mut data = [0u8; MAX_PAYLOAD];
    data.copy_from_slice(&frame[4..8]);
    let mut addr = [0u8; 8];
    addr.copy_from_slice(&frame[8..16]);
    let addr = u64::from_le_bytes(addr);
    let mut time = [0u8; 8];
    time.copy_from_slice(&frame[16..24]);
    let time = u64::from_le_bytes(time);

    let unsupported = MessageKind::Unsupported { msg_type: ty };
    let req_id = RequestId::try_from(frame[1]);
    let payload = || Payload::from_slice(data.get(..len as usize)?);

    let kind = match (ty, req_id) {
        (TYPE_SYNC, _) => MessageKind::Sync,
        (TYPE_READ, Ok(req_id)) if (len as usize) <= MAX_PAYLOAD => {
            MessageKind::ReadRequest { addr, req_id, len }
        }
        (TYPE_WRITE_POSTED, Ok(req_id)) => match payload() {
            Some(data) => MessageKind::WritePosted { addr, req_id, data },
            None => unsupported,
        },
        (TYPE_READ_COMP, Ok(req_id)) => match payload() {
            Some(data) => MessageKind::ReadCompletion { req_id, data },
            None => unsupported,
        },
        (TYPE_WRITE_COMP, Ok(req_id)) => MessageKind::WriteCompletion { req_id },
        _ => unsupported,
    };

    Message::new(time, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_request_layout() {
        let msg = Message::new(
            0x0102_0304,
            MessageKind::ReadRequest {
                addr: 0x100,
                req_id: RequestId::Instr,
                len: 4,
            },
        );
        let frame = encode(&msg);

        assert_eq!(frame[0], TYPE_READ);
        assert_eq!(frame[1], 0);
        assert_eq!(frame[2], 4);
        assert_eq!(&frame[8..16], &0x100u64.to_le_bytes());
        assert_eq!(&frame[16..24], &0x0102_0304u64.to_le_bytes());
        assert_eq!(decode(&frame), msg);
    }

    #[test]
    fn test_completion_payload_is_little_endian() {
        let msg = Message::read_completion(10, RequestId::Data, 0xDEAD_BEEF);
        let frame = encode(&msg);
        assert_eq!(&frame[4..8], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(decode(&frame), msg);
    }

    #[test]
    fn test_unknown_type_is_unsupported() {
        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0x7E;
        frame[16] = 9;
        let msg = decode(&frame);
        assert_eq!(msg.time, 9);
        assert_eq!(msg.kind, MessageKind::Unsupported { msg_type: 0x7E });
    }

    #[test]
    fn test_unknown_request_id_is_unsupported() {
        let mut frame = encode(&Message::read_completion(0, RequestId::Instr, 1));
        frame[1] = 9;
        assert_eq!(
            decode(&frame).kind,
            MessageKind::Unsupported {
                msg_type: TYPE_READ_COMP
            }
        );
    }

    #[test]
    fn test_oversized_length_is_unsupported() {
        let mut frame = encode(&Message::read_completion(0, RequestId::Data, 1));
        frame[2] = 8;
        assert!(matches!(
            decode(&frame).kind,
            MessageKind::Unsupported { .. }
        ));
    }

    #[test]
    fn test_sync_ignores_request_id() {
        let mut frame = encode(&Message::sync(77));
        frame[1] = 0xFF;
        assert_eq!(decode(&frame), Message::sync(77));
    }
}
