//! Core type definitions for the bridge.
//!
//! This module defines the fundamental types shared by the tracker, the
//! translator and the transports.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation time unit (picoseconds).
///
/// The scheduler's clock, every message timestamp and every link latency use
/// the same `SimTime` representation, so both sides of the bridge share one
/// timeline.
pub type SimTime = u64;

/// Picoseconds per nanosecond, used when scaling link parameters.
pub const PS_PER_NS: SimTime = 1000;

/// One of the three request channels tracked by the bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    /// Instruction fetch (instruction port).
    InstrFetch,
    /// Data read (data port).
    DataRead,
    /// Posted data write (data port).
    DataWrite,
}

impl Channel {
    /// All channels, in tracker order.
    pub const ALL: [Channel; 3] = [Channel::InstrFetch, Channel::DataRead, Channel::DataWrite];

    /// Returns the core port this channel is issued on.
    pub fn port(self) -> Port {
        match self {
            Channel::InstrFetch => Port::Instr,
            Channel::DataRead | Channel::DataWrite => Port::Data,
        }
    }

    /// Returns the request id placed on the wire for this channel.
    pub fn request_id(self) -> RequestId {
        match self {
            Channel::InstrFetch => RequestId::Instr,
            Channel::DataRead => RequestId::Data,
            Channel::DataWrite => RequestId::DataWrite,
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Channel::InstrFetch => 0,
            Channel::DataRead => 1,
            Channel::DataWrite => 2,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::InstrFetch => write!(f, "instruction-fetch"),
            Channel::DataRead => write!(f, "data-read"),
            Channel::DataWrite => write!(f, "data-write"),
        }
    }
}

/// A core memory port. Each port has one grant pin and one response latch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    /// Instruction port.
    Instr,
    /// Data port, shared by reads and posted writes.
    Data,
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Instr => write!(f, "instruction"),
            Port::Data => write!(f, "data"),
        }
    }
}

/// Request identifier carried in every message.
///
/// Completions from the far side only ever carry `Instr` or `Data`.
/// `DataWrite` tags posted writes for local bookkeeping; no completion is
/// expected for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestId {
    /// Instruction fetch.
    Instr = 0,
    /// Data read.
    Data = 1,
    /// Posted data write.
    DataWrite = 2,
}

impl RequestId {
    /// Returns the wire encoding of this id.
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for RequestId {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(RequestId::Instr),
            1 => Ok(RequestId::Data),
            2 => Ok(RequestId::DataWrite),
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_ports() {
        assert_eq!(Channel::InstrFetch.port(), Port::Instr);
        assert_eq!(Channel::DataRead.port(), Port::Data);
        assert_eq!(Channel::DataWrite.port(), Port::Data);
    }

    #[test]
    fn test_channel_request_ids() {
        assert_eq!(Channel::InstrFetch.request_id(), RequestId::Instr);
        assert_eq!(Channel::DataRead.request_id(), RequestId::Data);
        assert_eq!(Channel::DataWrite.request_id(), RequestId::DataWrite);
    }

    #[test]
    fn test_request_id_codes() {
        assert_eq!(RequestId::Instr.code(), 0);
        assert_eq!(RequestId::try_from(1), Ok(RequestId::Data));
        assert_eq!(RequestId::try_from(2), Ok(RequestId::DataWrite));
        assert_eq!(RequestId::try_from(7), Err(7));
    }
}
