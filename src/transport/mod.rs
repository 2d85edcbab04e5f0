//! The message transport seam.
//!
//! The bridge never talks to the memory side directly. It allocates outbound
//! slots, sends messages into them, flushes up to a timestamp and polls the
//! inbound queue, all through the [`Transport`] trait. Concrete transports:
//!
//! - [`LoopbackTransport`]: in-process link with a [`MemoryDevice`] peer
//! - [`StreamTransport`]: fixed-size frames over a Unix or TCP socket
//! - [`MockTransport`]: scripted inbound queue for tests
//! - [`TracedTransport`]: decorator writing a JSON-lines message trace
//!
//! [`MemoryDevice`]: crate::memory::MemoryDevice

pub mod loopback;
pub mod mock;
pub mod stream;
pub mod trace;
pub mod wire;

use thiserror::Error;

use crate::message::{Message, MessageKind};
use crate::types::SimTime;

pub use loopback::LoopbackTransport;
pub use mock::MockTransport;
pub use stream::StreamTransport;
pub use trace::TracedTransport;

/// Errors raised by transports and the wire codec.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer closed the connection")]
    Disconnected,

    #[error("{pending} bytes could not be flushed yet")]
    WouldBlock { pending: usize },

    #[error("sync to time {requested} rejected: {reason}")]
    SyncRejected { requested: SimTime, reason: String },

    #[error("trace error: {0}")]
    Trace(#[from] serde_json::Error),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// An allocated outbound slot.
///
/// Holding a slot means the transport has room for one more message. The
/// slot already carries the timestamp at which the message will become
/// visible to the receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutSlot {
    /// Receiver-visible timestamp of the message sent into this slot
    pub time: SimTime,
}

/// Timestamped, ordered message link to the memory side.
///
/// Inbound messages are consumed with a poll/done pair: [`in_poll`] peeks at
/// the head of the queue if it is due, [`in_done`] releases it.
///
/// [`in_poll`]: Transport::in_poll
/// [`in_done`]: Transport::in_done
pub trait Transport {
    /// Reserves room for one outbound message sent at `time`.
    ///
    /// Returns `None` when the link is full.
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot>;

    /// Sends `kind` in a previously allocated slot.
    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()>;

    /// Flushes queued outbound messages and emits any heartbeat due at `time`.
    fn out_sync(&mut self, time: SimTime) -> TransportResult<()>;

    /// Returns the head of the inbound queue if its timestamp is `<= time`.
    ///
    /// The message stays queued until [`in_done`](Transport::in_done).
    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>>;

    /// Releases the message returned by the last successful poll.
    fn in_done(&mut self);

    /// Timestamp of the earliest unread inbound message, if one is buffered.
    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>>;

    /// Flushes and releases the link. Called once, at shutdown.
    fn close(&mut self) -> TransportResult<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot> {
        (**self).out_alloc(time)
    }

    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()> {
        (**self).out_send(slot, kind)
    }

    fn out_sync(&mut self, time: SimTime) -> TransportResult<()> {
        (**self).out_sync(time)
    }

    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>> {
        (**self).in_poll(time)
    }

    fn in_done(&mut self) {
        (**self).in_done()
    }

    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>> {
        (**self).in_timestamp()
    }

    fn close(&mut self) -> TransportResult<()> {
        (**self).close()
    }
}
