//! Message definitions for the memory protocol.
//!
//! Messages are the only unit of communication between the bridge and the
//! memory side. Each one carries the timestamp at which it becomes visible to
//! its receiver and a tagged kind describing the transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{RequestId, SimTime};

/// Maximum number of payload bytes carried by one message.
pub const MAX_PAYLOAD: usize = 4;

/// Up to four little-endian data bytes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    len: u8,
    bytes: [u8; MAX_PAYLOAD],
}

impl Payload {
    /// Creates a payload from a byte slice.
    ///
    /// Returns `None` if the slice is longer than [`MAX_PAYLOAD`].
    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() > MAX_PAYLOAD {
            return None;
        }
        let mut bytes = [0u8; MAX_PAYLOAD];
        bytes[..data.len()].copy_from_slice(data);
        Some(Self {
            len: data.len() as u8,
            bytes,
        })
    }

    /// Creates a payload holding the low `len` bytes of `word`.
    ///
    /// `len` is clamped to [`MAX_PAYLOAD`].
    pub fn from_word(word: u32, len: u8) -> Self {
        let len = len.min(MAX_PAYLOAD as u8);
        let mut bytes = [0u8; MAX_PAYLOAD];
        bytes[..len as usize].copy_from_slice(&word.to_le_bytes()[..len as usize]);
        Self { len, bytes }
    }

    /// Number of valid bytes.
    pub fn len(&self) -> u8 {
        self.len
    }

    /// Returns true if the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The payload zero-extended to a little-endian word.
    pub fn to_word(&self) -> u32 {
        let mut word = [0u8; MAX_PAYLOAD];
        word[..self.len as usize].copy_from_slice(self.as_slice());
        u32::from_le_bytes(word)
    }

    /// The raw four-byte buffer, including bytes past `len`.
    pub fn raw(&self) -> [u8; MAX_PAYLOAD] {
        self.bytes
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:02x?})", self.as_slice())
    }
}

/// A timestamped protocol message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The simulation time at which the receiver may consume this message
    pub time: SimTime,
    /// What the message carries
    pub kind: MessageKind,
}

impl Message {
    /// Creates a new message.
    pub fn new(time: SimTime, kind: MessageKind) -> Self {
        Self { time, kind }
    }

    /// Creates a read completion carrying a full data word.
    pub fn read_completion(time: SimTime, req_id: RequestId, word: u32) -> Self {
        Self::new(
            time,
            MessageKind::ReadCompletion {
                req_id,
                data: Payload::from_word(word, MAX_PAYLOAD as u8),
            },
        )
    }

    /// Creates a sync marker.
    pub fn sync(time: SimTime) -> Self {
        Self::new(time, MessageKind::Sync)
    }
}

/// The kind of a message and its transaction fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageKind {
    /// Read request, bridge to memory.
    ReadRequest {
        /// Byte address
        addr: u64,
        /// Originating channel tag
        req_id: RequestId,
        /// Bytes to read (at most 4)
        len: u8,
    },

    /// Posted write request, bridge to memory. No completion is expected.
    WritePosted {
        /// Byte address
        addr: u64,
        /// Originating channel tag
        req_id: RequestId,
        /// Bytes to store; the length is the payload length
        data: Payload,
    },

    /// Read completion, memory to bridge.
    ReadCompletion {
        /// Tag of the request being completed
        req_id: RequestId,
        /// Data read
        data: Payload,
    },

    /// Write completion, memory to bridge. Only non-posted writes produce
    /// these, so the bridge ignores them.
    WriteCompletion {
        /// Tag of the request being completed
        req_id: RequestId,
    },

    /// Timing heartbeat carrying no transaction.
    Sync,

    /// A frame whose type code or request id is not understood.
    Unsupported {
        /// Raw type code from the wire
        msg_type: u8,
    },
}

impl MessageKind {
    /// Short name used in logs and traces.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::ReadRequest { .. } => "read",
            MessageKind::WritePosted { .. } => "write-posted",
            MessageKind::ReadCompletion { .. } => "read-completion",
            MessageKind::WriteCompletion { .. } => "write-completion",
            MessageKind::Sync => "sync",
            MessageKind::Unsupported { .. } => "unsupported",
        }
    }

    /// Returns true for a sync marker.
    pub fn is_sync(&self) -> bool {
        matches!(self, MessageKind::Sync)
    }
}
