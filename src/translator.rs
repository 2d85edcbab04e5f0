//! Protocol translation between core pins and memory messages.
//!
//! [`Translator::core_to_mem`] turns the sampled request pins into outbound
//! requests, one per channel at a time. [`Translator::mem_to_core`] consumes
//! one inbound message and routes completions into the response latches.

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::message::{Message, MessageKind, Payload};
use crate::model::CoreOutputs;
use crate::tracker::{BridgeState, DelayedResponse};
use crate::transport::Transport;
use crate::types::{Channel, Port, RequestId, SimTime};

/// Counters kept by the translator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TranslatorStats {
    /// Instruction fetches sent
    pub instr_reads: u64,
    /// Data reads sent
    pub data_reads: u64,
    /// Posted writes sent
    pub posted_writes: u64,
    /// Instruction completions routed
    pub instr_completions: u64,
    /// Data read completions routed
    pub data_completions: u64,
    /// Posted writes acknowledged locally
    pub local_write_acks: u64,
    /// Passes cut short by a full link
    pub backpressure_stalls: u64,
    /// Inbound messages the bridge does not handle
    pub unsupported_messages: u64,
    /// Write completions and sync markers
    pub ignored_messages: u64,
}

/// Length of a posted write for the given byte enables.
pub fn write_len(be: u8) -> u8 {
    match be {
        0b0001 => 1,
        0b0011 => 2,
        _ => 4,
    }
}

/// Converts between pin activity and protocol messages.
#[derive(Clone, Debug)]
pub struct Translator {
    sentinel_addr: u32,
    sentinel_value: u32,
    stats: TranslatorStats,
}

impl Translator {
    /// Creates a translator that treats a write of `value` to `addr` as the
    /// end of the cosimulation.
    pub fn new(sentinel_addr: u32, sentinel_value: u32) -> Self {
        Self {
            sentinel_addr,
            sentinel_value,
            stats: TranslatorStats::default(),
        }
    }

    /// Counters.
    pub fn stats(&self) -> &TranslatorStats {
        &self.stats
    }

    /// Issues requests for the sampled pins.
    ///
    /// Clears last tick's latch flags first. The instruction port is served
    /// before the data port; a full link ends the pass and marks the ports
    /// that could not be served as stalled.
    pub fn core_to_mem<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: SimTime,
        pins: &CoreOutputs,
        state: &mut BridgeState,
    ) -> BridgeResult<()> {
        state.latches.begin_tick();
        state.clear_stalls();

        if pins.instr_req && state.tracker.can_issue(Channel::InstrFetch) {
            let kind = MessageKind::ReadRequest {
                addr: u64::from(pins.instr_addr),
                req_id: RequestId::Instr,
                len: 4,
            };
            if !self.issue(transport, now, Channel::InstrFetch, kind, state)? {
                state.stall(Port::Data);
                return Ok(());
            }
            self.stats.instr_reads += 1;
        }

        if pins.data_req
            && pins.data_we
            && pins.data_addr == self.sentinel_addr
            && pins.data_wdata == self.sentinel_value
        {
            info!(time = now, addr = format_args!("{:#x}", pins.data_addr), "termination sentinel written");
            state.terminal = true;
            return Ok(());
        }

        if pins.data_req && !state.tracker.port_busy(Port::Data) {
            if pins.data_we {
                let len = write_len(pins.data_be);
                let kind = MessageKind::WritePosted {
                    addr: u64::from(pins.data_addr),
                    req_id: RequestId::DataWrite,
                    data: Payload::from_word(pins.data_wdata, len),
                };
                if self.issue(transport, now, Channel::DataWrite, kind, state)? {
                    self.stats.posted_writes += 1;
                }
            } else {
                let kind = MessageKind::ReadRequest {
                    addr: u64::from(pins.data_addr),
                    req_id: RequestId::Data,
                    len: 4,
                };
                if self.issue(transport, now, Channel::DataRead, kind, state)? {
                    self.stats.data_reads += 1;
                }
            }
        } else if state.tracker.is_outstanding(Channel::DataWrite) {
            state.tracker.clear_outstanding(Channel::DataWrite);
            state.latches.data.valid = true;
            self.stats.local_write_acks += 1;
            trace!(time = now, "posted write acknowledged");
        }

        Ok(())
    }

    /// Allocates, sends and marks `channel` outstanding.
    ///
    /// Returns false, with the channel's port marked stalled, when the link is
    /// full.
    fn issue<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: SimTime,
        channel: Channel,
        kind: MessageKind,
        state: &mut BridgeState,
    ) -> BridgeResult<bool> {
        let Some(slot) = transport.out_alloc(now) else {
            debug!(time = now, %channel, "no outbound slot; retrying next tick");
            self.stats.backpressure_stalls += 1;
            state.stall(channel.port());
            return Ok(false);
        };
        debug!(time = now, arrival = slot.time, %channel, kind = ?kind, "request sent");
        transport.out_send(slot, kind)?;
        state.tracker.mark_outstanding(channel);
        Ok(true)
    }

    /// Consumes at most one inbound message due at `now`.
    ///
    /// Returns whether a message was consumed.
    pub fn mem_to_core<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: SimTime,
        state: &mut BridgeState,
    ) -> BridgeResult<bool> {
        let Some(msg) = transport.in_poll(now)? else {
            return Ok(false);
        };
        let routed = self.route(now, &msg, state);
        transport.in_done();
        routed.map(|()| true)
    }

    fn route(&mut self, now: SimTime, msg: &Message, state: &mut BridgeState) -> BridgeResult<()> {
        match &msg.kind {
            MessageKind::ReadCompletion { req_id, data } => match req_id {
                RequestId::Instr => {
                    self.complete(now, Channel::InstrFetch, data, state)?;
                    self.stats.instr_completions += 1;
                }
                RequestId::Data => {
                    self.complete(now, Channel::DataRead, data, state)?;
                    self.stats.data_completions += 1;
                }
                RequestId::DataWrite => {
                    return Err(BridgeError::UnroutableCompletion {
                        req_id: *req_id,
                        time: now,
                    })
                }
            },
            MessageKind::WriteCompletion { .. } | MessageKind::Sync => {
                trace!(time = msg.time, kind = msg.kind.name(), "ignored");
                self.stats.ignored_messages += 1;
            }
            MessageKind::ReadRequest { .. }
            | MessageKind::WritePosted { .. }
            | MessageKind::Unsupported { .. } => {
                error!(time = msg.time, kind = ?msg.kind, "unsupported inbound message");
                self.stats.unsupported_messages += 1;
            }
        }
        Ok(())
    }

    fn complete(
        &mut self,
        now: SimTime,
        channel: Channel,
        data: &Payload,
        state: &mut BridgeState,
    ) -> BridgeResult<()> {
        let port = channel.port();
        if state.latches.get(port).valid {
            return Err(BridgeError::DoubleCompletion { port, time: now });
        }
        if !state.tracker.is_outstanding(channel) {
            warn!(time = now, %channel, "completion without an outstanding request");
        }
        state.tracker.clear_outstanding(channel);
        *state.latches.get_mut(port) = DelayedResponse {
            valid: true,
            data: data.to_word(),
            error: false,
        };
        debug!(time = now, %channel, data = format_args!("{:#010x}", data.to_word()), "completion");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn translator() -> Translator {
        Translator::new(0x20008, 1)
    }

    fn fetch(addr: u32) -> CoreOutputs {
        CoreOutputs {
            instr_req: true,
            instr_addr: addr,
            ..Default::default()
        }
    }

    fn store(addr: u32, wdata: u32, be: u8) -> CoreOutputs {
        CoreOutputs {
            data_req: true,
            data_we: true,
            data_addr: addr,
            data_wdata: wdata,
            data_be: be,
            ..Default::default()
        }
    }

    #[test]
    fn test_write_len() {
        assert_eq!(write_len(0b0001), 1);
        assert_eq!(write_len(0b0011), 2);
        assert_eq!(write_len(0b1111), 4);
        assert_eq!(write_len(0b0010), 4);
        assert_eq!(write_len(0b1100), 4);
    }

    #[test]
    fn test_instruction_fetch_issues_once() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();

        tr.core_to_mem(&mut mock, 0, &fetch(0x100), &mut state).unwrap();
        tr.core_to_mem(&mut mock, 10, &fetch(0x100), &mut state).unwrap();

        assert_eq!(mock.sent().len(), 1);
        assert_eq!(
            mock.sent()[0].kind,
            MessageKind::ReadRequest {
                addr: 0x100,
                req_id: RequestId::Instr,
                len: 4
            }
        );
        assert!(state.tracker.is_outstanding(Channel::InstrFetch));
        assert_eq!(tr.stats().instr_reads, 1);
    }

    #[test]
    fn test_both_ports_issue_in_one_pass() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        let pins = CoreOutputs {
            instr_req: true,
            instr_addr: 0x80,
            data_req: true,
            data_addr: 0x400,
            ..Default::default()
        };

        tr.core_to_mem(&mut mock, 0, &pins, &mut state).unwrap();

        let kinds: Vec<_> = mock.sent().iter().map(|m| m.kind.clone()).collect();
        assert_eq!(kinds.len(), 2);
        assert!(matches!(kinds[0], MessageKind::ReadRequest { req_id: RequestId::Instr, .. }));
        assert!(matches!(kinds[1], MessageKind::ReadRequest { req_id: RequestId::Data, addr: 0x400, .. }));
    }

    #[test]
    fn test_posted_write_and_local_ack() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();

        tr.core_to_mem(&mut mock, 0, &store(0x1000, 0x7F, 0b0001), &mut state).unwrap();
        assert_eq!(
            mock.sent()[0].kind,
            MessageKind::WritePosted {
                addr: 0x1000,
                req_id: RequestId::DataWrite,
                data: Payload::from_slice(&[0x7F]).unwrap(),
            }
        );
        assert!(!state.tracker.grant(Port::Data));
        assert!(!state.latches.data.valid);

        tr.core_to_mem(&mut mock, 10, &CoreOutputs::default(), &mut state).unwrap();
        assert!(state.latches.data.valid);
        assert!(state.tracker.grant(Port::Data));
        assert_eq!(mock.sent().len(), 1);
        assert_eq!(tr.stats().local_write_acks, 1);

        // The acknowledgment lasts one tick.
        tr.core_to_mem(&mut mock, 20, &CoreOutputs::default(), &mut state).unwrap();
        assert!(!state.latches.data.valid);
    }

    #[test]
    fn test_sentinel_suppresses_emission() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        state.tracker.mark_outstanding(Channel::DataRead);

        tr.core_to_mem(&mut mock, 0, &store(0x20008, 1, 0b1111), &mut state).unwrap();

        assert!(state.terminal);
        assert!(mock.sent().is_empty());
    }

    #[test]
    fn test_near_sentinel_is_a_normal_write() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();

        tr.core_to_mem(&mut mock, 0, &store(0x20008, 2, 0b1111), &mut state).unwrap();

        assert!(!state.terminal);
        assert_eq!(mock.sent().len(), 1);
    }

    #[test]
    fn test_backpressure_leaves_state_untouched() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        mock.refuse_next_allocs(1);
        let pins = CoreOutputs {
            instr_req: true,
            data_req: true,
            ..Default::default()
        };

        tr.core_to_mem(&mut mock, 0, &pins, &mut state).unwrap();
        assert!(mock.sent().is_empty());
        assert_eq!(state.tracker.outstanding_count(), 0);
        assert!(state.is_stalled(Port::Instr));
        assert!(state.is_stalled(Port::Data));
        assert_eq!(tr.stats().backpressure_stalls, 1);

        tr.core_to_mem(&mut mock, 10, &pins, &mut state).unwrap();
        assert_eq!(mock.sent().len(), 2);
        assert!(!state.is_stalled(Port::Instr));
    }

    #[test]
    fn test_completion_routing() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        state.tracker.mark_outstanding(Channel::InstrFetch);
        state.tracker.mark_outstanding(Channel::DataRead);
        mock.push_inbound(Message::read_completion(5, RequestId::Data, 0x55));

        assert!(tr.mem_to_core(&mut mock, 5, &mut state).unwrap());
        assert!(state.tracker.is_outstanding(Channel::InstrFetch));
        assert!(!state.tracker.is_outstanding(Channel::DataRead));
        assert_eq!(state.latches.data, DelayedResponse { valid: true, data: 0x55, error: false });
        assert!(!state.latches.instr.valid);
    }

    #[test]
    fn test_completion_drives_err_low() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        state.tracker.mark_outstanding(Channel::InstrFetch);
        state.latches.instr.error = true;
        mock.push_inbound(Message::read_completion(0, RequestId::Instr, 0x13));

        assert!(tr.mem_to_core(&mut mock, 0, &mut state).unwrap());
        assert!(state.latches.instr.valid);
        assert!(!state.latches.instr.error);
    }

    #[test]
    fn test_future_message_not_consumed() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        mock.push_inbound(Message::read_completion(50, RequestId::Instr, 1));

        assert!(!tr.mem_to_core(&mut mock, 49, &mut state).unwrap());
        assert_eq!(mock.inbound_len(), 1);
    }

    #[test]
    fn test_double_completion_is_fatal() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        state.tracker.mark_outstanding(Channel::InstrFetch);
        mock.push_inbound(Message::read_completion(0, RequestId::Instr, 1));
        mock.push_inbound(Message::read_completion(0, RequestId::Instr, 2));

        tr.mem_to_core(&mut mock, 0, &mut state).unwrap();
        let err = tr.mem_to_core(&mut mock, 0, &mut state).unwrap_err();
        assert!(matches!(err, BridgeError::DoubleCompletion { port: Port::Instr, .. }));
    }

    #[test]
    fn test_data_write_completion_is_unroutable() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        mock.push_inbound(Message::read_completion(0, RequestId::DataWrite, 1));

        let err = tr.mem_to_core(&mut mock, 0, &mut state).unwrap_err();
        assert!(matches!(err, BridgeError::UnroutableCompletion { .. }));
        assert_eq!(mock.consumed(), 1);
    }

    #[test]
    fn test_ignored_and_unsupported_are_consumed() {
        let mut tr = translator();
        let mut mock = MockTransport::new();
        let mut state = BridgeState::new();
        mock.push_inbound(Message::sync(0));
        mock.push_inbound(Message::new(0, MessageKind::WriteCompletion { req_id: RequestId::Data }));
        mock.push_inbound(Message::new(0, MessageKind::Unsupported { msg_type: 0x7E }));
        mock.push_inbound(Message::new(
            0,
            MessageKind::ReadRequest {
                addr: 0,
                req_id: RequestId::Data,
                len: 4,
            },
        ));

        for _ in 0..4 {
            assert!(tr.mem_to_core(&mut mock, 0, &mut state).unwrap());
        }
        assert_eq!(mock.consumed(), 4);
        assert_eq!(tr.stats().ignored_messages, 2);
        assert_eq!(tr.stats().unsupported_messages, 2);
        assert_eq!(state.tracker.outstanding_count(), 0);
    }
}
