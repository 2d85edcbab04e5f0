//! In-process transport with a memory device on the far end.
//!
//! The loopback link models a point-to-point connection with a fixed one-way
//! latency and a bounded number of messages in flight towards the peer. The
//! peer is a [`MemoryDevice`] that advances in lockstep with the bridge: every
//! [`out_sync`](Transport::out_sync) moves the peer to the flushed time.
//!
//! # Timing
//!
//! A request sent at `t` carries timestamp `t + latency` and reaches the peer
//! on the first flush at or after that time. The peer answers after its
//! access latency, stamping the completion with its own time plus the link
//! latency. A read therefore takes at least two link latencies plus the
//! memory latency.
//!
//! In synchronized mode the peer keeps a message with a timestamp beyond the
//! current time in the inbound queue (a sync marker if nothing else), so the
//! bridge's drain loop always finds an end.
//!
//! # Example
//!
//! ```
//! use membridge::memory::MemoryDevice;
//! use membridge::transport::{LoopbackTransport, Transport};
//!
//! let mut link = LoopbackTransport::new(MemoryDevice::new(0))
//!     .with_latency(1000)
//!     .with_capacity(4);
//!
//! assert_eq!(link.out_alloc(0).map(|slot| slot.time), Some(1000));
//! ```

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, warn};

use crate::memory::MemoryDevice;
use crate::message::{Message, MessageKind, Payload};
use crate::transport::{OutSlot, Transport, TransportResult};
use crate::types::SimTime;

/// Default one-way link latency (500 ns).
pub const DEFAULT_LATENCY: SimTime = 500_000;
/// Default sync interval (500 ns).
pub const DEFAULT_SYNC_INTERVAL: SimTime = 500_000;
/// Default number of messages in flight towards the peer.
pub const DEFAULT_CAPACITY: usize = 32;

/// Counters kept by the loopback link.
#[derive(Clone, Debug, Default, Serialize)]
pub struct LoopbackStats {
    /// Requests delivered to the memory peer
    pub delivered: u64,
    /// Completions sent back by the peer
    pub responses: u64,
    /// Sync markers sent by the peer
    pub syncs: u64,
    /// Allocations refused because the link was full
    pub refused_allocs: u64,
}

/// In-process link to a [`MemoryDevice`].
#[derive(Debug)]
pub struct LoopbackTransport {
    latency: SimTime,
    capacity: usize,
    synchronized: bool,
    sync_interval: SimTime,
    next_sync: SimTime,
    /// Messages travelling towards the peer
    outbound: VecDeque<Message>,
    /// Completions waiting on the memory access latency
    pending: VecDeque<(SimTime, MessageKind)>,
    /// Messages travelling towards the bridge
    inbound: VecDeque<Message>,
    memory: MemoryDevice,
    stats: LoopbackStats,
}

impl LoopbackTransport {
    /// Creates a synchronized link with default latency and capacity.
    pub fn new(memory: MemoryDevice) -> Self {
        Self {
            latency: DEFAULT_LATENCY,
            capacity: DEFAULT_CAPACITY,
            synchronized: true,
            sync_interval: DEFAULT_SYNC_INTERVAL,
            next_sync: 0,
            outbound: VecDeque::new(),
            pending: VecDeque::new(),
            inbound: VecDeque::new(),
            memory,
            stats: LoopbackStats::default(),
        }
    }

    /// Sets the one-way link latency.
    pub fn with_latency(mut self, latency: SimTime) -> Self {
        self.latency = latency;
        self
    }

    /// Sets the number of messages that may be in flight towards the peer.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the maximum time between two sync markers from the peer.
    pub fn with_sync_interval(mut self, interval: SimTime) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Enables or disables sync markers.
    pub fn synchronized(mut self, enabled: bool) -> Self {
        self.synchronized = enabled;
        self
    }

    /// Messages still travelling towards the peer.
    pub fn in_flight(&self) -> usize {
        self.outbound.len()
    }

    /// Messages waiting to be polled by the bridge.
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// The memory peer.
    pub fn memory(&self) -> &MemoryDevice {
        &self.memory
    }

    /// The memory peer, mutably.
    pub fn memory_mut(&mut self) -> &mut MemoryDevice {
        &mut self.memory
    }

    /// Link counters.
    pub fn stats(&self) -> &LoopbackStats {
        &self.stats
    }

    fn serve(&mut self, msg: Message, now: SimTime) {
        self.stats.delivered += 1;
        match msg.kind {
            MessageKind::ReadRequest { addr, req_id, len } => {
                let word = self.memory.read(addr, len);
                let ready = now + self.memory.latency();
                self.pending.push_back((
                    ready,
                    MessageKind::ReadCompletion {
                        req_id,
                        data: Payload::from_word(word, len),
                    },
                ));
            }
            MessageKind::WritePosted { addr, data, .. } => {
                self.memory.write(addr, data.as_slice());
            }
            MessageKind::Sync => {}
            other => {
                warn!(time = now, kind = other.name(), "memory peer dropped unexpected message");
            }
        }
    }

    fn push_inbound(&mut self, msg: Message) {
        debug!(time = msg.time, kind = msg.kind.name(), "peer send");
        self.inbound.push_back(msg);
    }
}

impl Transport for LoopbackTransport {
    fn out_alloc(&mut self, time: SimTime) -> Option<OutSlot> {
        if self.outbound.len() >= self.capacity {
            self.stats.refused_allocs += 1;
            return None;
        }
        Some(OutSlot {
            time: time + self.latency,
        })
    }

    fn out_send(&mut self, slot: OutSlot, kind: MessageKind) -> TransportResult<()> {
        self.outbound.push_back(Message::new(slot.time, kind));
        Ok(())
    }

    fn out_sync(&mut self, time: SimTime) -> TransportResult<()> {
        while self.outbound.front().is_some_and(|m| m.time <= time) {
            if let Some(msg) = self.outbound.pop_front() {
                self.serve(msg, time);
            }
        }

        let stamp = time + self.latency;
        while self.pending.front().is_some_and(|(ready, _)| *ready <= time) {
            if let Some((_, kind)) = self.pending.pop_front() {
                self.stats.responses += 1;
                self.push_inbound(Message::new(stamp, kind));
            }
        }

        if self.synchronized {
            let covered = self.inbound.back().is_some_and(|m| m.time > time);
            if time >= self.next_sync || !covered {
                if self.inbound.back().map_or(true, |m| m.time < stamp) {
                    self.stats.syncs += 1;
                    self.push_inbound(Message::sync(stamp));
                }
                self.next_sync = time + self.sync_interval;
            }
        }
        Ok(())
    }

    fn in_poll(&mut self, time: SimTime) -> TransportResult<Option<Message>> {
        Ok(self.inbound.front().filter(|m| m.time <= time).cloned())
    }

    fn in_done(&mut self) {
        self.inbound.pop_front();
    }

    fn in_timestamp(&mut self) -> TransportResult<Option<SimTime>> {
        Ok(self.inbound.front().map(|m| m.time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestId;

    fn read(addr: u64, req_id: RequestId) -> MessageKind {
        MessageKind::ReadRequest { addr, req_id, len: 4 }
    }

    #[test]
    fn test_slot_carries_latency() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(0)).with_latency(700);
        assert_eq!(link.out_alloc(100), Some(OutSlot { time: 800 }));
    }

    #[test]
    fn test_capacity_backpressure() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(0))
            .with_latency(1000)
            .with_capacity(1);

        let slot = link.out_alloc(0).unwrap();
        link.out_send(slot, read(0x100, RequestId::Instr)).unwrap();
        assert!(link.out_alloc(0).is_none());
        assert_eq!(link.stats().refused_allocs, 1);

        // The request reaches the peer once the link time has passed.
        link.out_sync(1000).unwrap();
        assert_eq!(link.in_flight(), 0);
        assert!(link.out_alloc(1000).is_some());
    }

    #[test]
    fn test_read_round_trip() {
        let mut mem = MemoryDevice::new(0);
        mem.poke_word(0x100, 0xDEAD_BEEF);
        let mut link = LoopbackTransport::new(mem)
            .with_latency(1000)
            .synchronized(false);

        let slot = link.out_alloc(0).unwrap();
        link.out_send(slot, read(0x100, RequestId::Instr)).unwrap();

        link.out_sync(500).unwrap();
        assert!(link.in_poll(u64::MAX).unwrap().is_none());

        link.out_sync(1000).unwrap();
        assert_eq!(link.in_timestamp().unwrap(), Some(2000));
        assert!(link.in_poll(1999).unwrap().is_none());

        let msg = link.in_poll(2000).unwrap().unwrap();
        assert_eq!(msg, Message::read_completion(2000, RequestId::Instr, 0xDEAD_BEEF));

        // Polling peeks; only in_done consumes.
        assert!(link.in_poll(2000).unwrap().is_some());
        link.in_done();
        assert!(link.in_poll(2000).unwrap().is_none());
    }

    #[test]
    fn test_memory_latency_delays_completion() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(3000))
            .with_latency(1000)
            .synchronized(false);

        let slot = link.out_alloc(0).unwrap();
        link.out_send(slot, read(0x0, RequestId::Data)).unwrap();

        link.out_sync(1000).unwrap();
        assert_eq!(link.inbound_len(), 0);
        link.out_sync(3999).unwrap();
        assert_eq!(link.inbound_len(), 0);
        link.out_sync(4000).unwrap();
        assert_eq!(link.in_timestamp().unwrap(), Some(5000));
    }

    #[test]
    fn test_posted_write_updates_memory_without_reply() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(0))
            .with_latency(10)
            .synchronized(false);

        let slot = link.out_alloc(0).unwrap();
        let data = Payload::from_word(0x7F, 1);
        link.out_send(
            slot,
            MessageKind::WritePosted {
                addr: 0x1000,
                req_id: RequestId::DataWrite,
                data,
            },
        )
        .unwrap();
        link.out_sync(10).unwrap();

        assert_eq!(link.memory().peek(0x1000, 1), 0x7F);
        assert_eq!(link.inbound_len(), 0);
    }

    #[test]
    fn test_sync_marker_always_ahead() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(0))
            .with_latency(100)
            .with_sync_interval(1_000_000);

        for t in (0..1000).step_by(40) {
            link.out_sync(t).unwrap();
            let ts = link.in_timestamp().unwrap();
            assert!(ts.is_some());
            // Drain everything due, like the barrier does.
            while let Some(msg) = link.in_poll(t).unwrap() {
                assert!(msg.kind.is_sync());
                link.in_done();
            }
            assert!(link.in_timestamp().unwrap().unwrap() > t);
        }
    }

    #[test]
    fn test_unsynchronized_link_sends_no_markers() {
        let mut link = LoopbackTransport::new(MemoryDevice::new(0)).synchronized(false);
        link.out_sync(0).unwrap();
        link.out_sync(10_000_000).unwrap();
        assert_eq!(link.in_timestamp().unwrap(), None);
        assert_eq!(link.stats().syncs, 0);
    }
}
