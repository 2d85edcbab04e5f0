//! Outstanding-request tracking and delayed response latches.
//!
//! The tracker enforces the single-outstanding-request discipline for each
//! channel. The latches hold responses that become visible to the core on the
//! next sampling point.

use serde::Serialize;

use crate::types::{Channel, Port};

/// Per-channel outstanding flags.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestTracker {
    outstanding: [bool; 3],
}

impl RequestTracker {
    /// Creates a tracker with every channel idle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `channel` has a request in flight.
    #[inline]
    pub fn is_outstanding(&self, channel: Channel) -> bool {
        self.outstanding[channel.index()]
    }

    /// Returns true iff no request is outstanding on `channel`.
    #[inline]
    pub fn can_issue(&self, channel: Channel) -> bool {
        !self.is_outstanding(channel)
    }

    /// Marks `channel` as having a request in flight.
    ///
    /// # Panics
    /// If the channel is already outstanding. That can only happen when the
    /// bridge and the core disagree about the protocol state.
    pub fn mark_outstanding(&mut self, channel: Channel) {
        assert!(
            self.can_issue(channel),
            "{channel} request issued while one is already outstanding"
        );
        self.outstanding[channel.index()] = true;
    }

    /// Clears the outstanding flag of `channel`.
    pub fn clear_outstanding(&mut self, channel: Channel) {
        self.outstanding[channel.index()] = false;
    }

    /// Returns true if any channel on `port` is outstanding.
    pub fn port_busy(&self, port: Port) -> bool {
        Channel::ALL
            .iter()
            .any(|&c| c.port() == port && self.is_outstanding(c))
    }

    /// Grant pin value for `port`: the negation of its outstanding state.
    #[inline]
    pub fn grant(&self, port: Port) -> bool {
        !self.port_busy(port)
    }

    /// Number of channels currently outstanding.
    pub fn outstanding_count(&self) -> usize {
        self.outstanding.iter().filter(|&&b| b).count()
    }

    /// Returns every channel to idle.
    pub fn reset(&mut self) {
        self.outstanding = [false; 3];
    }
}

/// A response waiting to be driven onto the core's input pins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DelayedResponse {
    /// Drives the port's `rvalid` pin
    pub valid: bool,
    /// Drives the port's `rdata` pin
    pub data: u32,
    /// Drives the port's `err` pin. Completion frames carry no error
    /// status, so memory traffic always latches `false` here.
    pub error: bool,
}

/// The delayed responses for both ports.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResponseLatches {
    /// Instruction port latch
    pub instr: DelayedResponse,
    /// Data port latch
    pub data: DelayedResponse,
}

impl ResponseLatches {
    /// Returns the latch for `port`.
    pub fn get(&self, port: Port) -> &DelayedResponse {
        match port {
            Port::Instr => &self.instr,
            Port::Data => &self.data,
        }
    }

    /// Returns the latch for `port` mutably.
    pub fn get_mut(&mut self, port: Port) -> &mut DelayedResponse {
        match port {
            Port::Instr => &mut self.instr,
            Port::Data => &mut self.data,
        }
    }

    /// Drops last tick's responses. Data words are kept so the pins hold
    /// their value, only `valid` and `error` fall.
    pub fn begin_tick(&mut self) {
        for latch in [&mut self.instr, &mut self.data] {
            latch.valid = false;
            latch.error = false;
        }
    }
}

/// All mutable bridge state, owned by the scheduler and lent to the
/// translator and barrier for the duration of one call.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BridgeState {
    /// Outstanding request flags
    pub tracker: RequestTracker,
    /// Responses for the next sampling point
    pub latches: ResponseLatches,
    /// Set once the termination sentinel has been written
    pub terminal: bool,
    /// Ports whose request could not be sent this tick
    stalled: [bool; 2],
}

impl BridgeState {
    /// Creates an idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a request on `port` hit backpressure this tick.
    pub fn stall(&mut self, port: Port) {
        self.stalled[port_index(port)] = true;
    }

    /// Returns true if `port` hit backpressure this tick.
    pub fn is_stalled(&self, port: Port) -> bool {
        self.stalled[port_index(port)]
    }

    /// Forgets last tick's stalls.
    pub fn clear_stalls(&mut self) {
        self.stalled = [false; 2];
    }
}

fn port_index(port: Port) -> usize {
    match port {
        Port::Instr => 0,
        Port::Data => 1,
    }
}
