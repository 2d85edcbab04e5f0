//! Scriptable transport for testing.
//!
//! Inbound messages are queued by the test, outbound messages are recorded,
//! and allocation or sync failures can be injected on demand.

use std::collections::VecDeque;

use crate::message::{Message, MessageKind};
use crate::transport::{OutSlot, Transport, TransportError, TransportResult};
use crate::types::SimTime;

/// A transport whose behaviour is fully controlled by the test.
#[derive(Debug, Default)]
pub struct MockTransport {
    latency: SimTime,
    inbound: VecDeque<Message>,
    sent: Vec<Message>,
    syncs: Vec<SimTime>,
    refuse_allocs: usize,
    fail_syncs: usize,
    consumed: u64,
    closed: bool,
}

impl MockTransport {
    /// Creates a mock with zero latency and an empty inbound queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the latency added to allocated slots.
    pub fn with_latency(mut self, latency: SimTime) -> Self {
        self.latency = latency;
        self
    }

    /// Queues a message for the bridge to receive.
    pub fn push_inbound(&mut self, msg: Message) {
        self.inbound.push_back(msg);
    }

    /// Refuses the next `n` slot allocations.
    pub fn refuse_next_allocs(&mut self, n: usize) {
        self.refuse_allocs = n;
    }

    /// Fails the next `n` sync calls.
    pub fn fail_next_syncs(&mut self, n: usize) {
        self.fail_syncs = n;
    }

    /// Messages sent so far, in order.
    pub fn sent(&self) -> &[Message] {
        &self.sent
    }

    /// Removes and returns the messages sent so far.
    pub fn take_sent(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.sent)
    }

    /// Times passed to successful `out_sync` calls.
    pub fn syncs(&self) -> &[SimTime] {
        &self.syncs
    }

    /// Number of inbound messages released with `in_done`.
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Inbound messages not yet consumed.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Returns true once `close` was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for MockTransport {
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot> {
        if self.refuse_allocs > 0 {
            self.refuse_allocs -= 1;
            return None;
        }
        Some(OutSlot {
            time: time + self.latency,
        })
    }

    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()> {
        self.sent.push(Message::new(slot.time, kind));
        Ok(())
    }

    fn out_sync(&mut self, time: SimTime) -> TransportResult<()> {
        if self.fail_syncs > 0 {
            self.fail_syncs -= 1;
            return Err(TransportError::SyncRejected {
                requested: time,
                reason: "injected failure".to_string(),
            });
        }
        self.syncs.push(time);
        Ok(())
    }

    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>> {
        Ok(self.inbound.front().filter(|m| m.time <= time).cloned())
    }

    fn in_done(&mut self) {
        if self.inbound.pop_front().is_some() {
            self.consumed += 1;
        }
    }

    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>> {
        Ok(self.inbound.front().map(|m| m.time))
    }

    fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refused_allocs_recover() {
        let mut mock = MockTransport::new().with_latency(5);
        mock.refuse_next_allocs(2);

        assert!(mock.out_alloc(0).is_none());
        assert!(mock.out_alloc(0).is_none());
        assert_eq!(mock.out_alloc(10), Some(OutSlot { time: 15 }));
    }

    #[test]
    fn test_failed_syncs_are_not_recorded() {
        let mut mock = MockTransport::new();
        mock.fail_next_syncs(1);

        assert!(mock.out_sync(10).is_err());
        assert!(mock.out_sync(20).is_ok());
        assert_eq!(mock.syncs(), &[20]);
    }

    #[test]
    fn test_poll_respects_time() {
        let mut mock = MockTransport::new();
        mock.push_inbound(Message::sync(100));

        assert!(mock.in_poll(99).unwrap().is_none());
        assert_eq!(mock.in_poll(100).unwrap(), Some(Message::sync(100)));
        mock.in_done();
        assert_eq!(mock.consumed(), 1);
        assert_eq!(mock.in_timestamp().unwrap(), None);
    }
}
