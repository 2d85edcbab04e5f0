//! End-to-end bridge scenarios.
//!
//! These tests drive the scheduler tick by tick and check:
//! - Instruction fetch issue and completion latching
//! - Termination by the sentinel write
//! - Posted writes and their local acknowledgment
//! - Complete workloads against the in-process memory peer

mod common;

use common::{unsynced, PinCore};
use membridge::model::ScriptedCore;
use membridge::workload::{Workload, WorkloadOp};
use membridge::{
    BridgeConfigBuilder, Channel, DelayedResponse, LoopbackTransport, MemoryDevice, Message,
    MessageKind, MockTransport, Payload, Phase, Port, RequestId, Scheduler, Termination,
};

// ============================================================================
// Scenario A: instruction read
// ============================================================================

#[test]
fn test_instruction_read_issues_one_request() {
    let mut sched = Scheduler::new(PinCore::fetching(0x100), MockTransport::new(), &unsynced());
    sched.init().unwrap();
    assert_eq!(sched.step().unwrap(), Phase::Running);

    assert_eq!(
        sched.transport().sent(),
        &[Message::new(
            0,
            MessageKind::ReadRequest {
                addr: 0x100,
                req_id: RequestId::Instr,
                len: 4,
            }
        )]
    );
    assert!(sched.state().tracker.is_outstanding(Channel::InstrFetch));
    // Accepted on this edge, then the grant drops.
    assert!(sched.core().last_sample().instr.gnt);
    assert!(!sched.core().inputs.instr.gnt);

    // The request pin stays up but nothing more is issued.
    sched.step().unwrap();
    assert_eq!(sched.transport().sent().len(), 1);
}

#[test]
fn test_instruction_completion_is_latched() {
    let mut sched = Scheduler::new(PinCore::fetching(0x100), MockTransport::new(), &unsynced());
    sched.init().unwrap();
    sched.step().unwrap();

    sched
        .transport_mut()
        .push_inbound(Message::read_completion(4000, RequestId::Instr, 0xDEAD_BEEF));
    sched.step().unwrap();

    assert_eq!(
        *sched.state().latches.get(Port::Instr),
        DelayedResponse {
            valid: true,
            data: 0xDEAD_BEEF,
            error: false,
        }
    );
    assert!(!sched.state().tracker.is_outstanding(Channel::InstrFetch));
    assert!(!sched.state().latches.get(Port::Data).valid);
    assert_eq!(sched.transport().consumed(), 1);

    // Driven between the edges, sampled on the next rising edge.
    assert!(!sched.core().last_sample().instr.rvalid);
    sched.core_mut().idle();
    sched.step().unwrap();

    let sample = sched.core().last_sample();
    assert!(sample.instr.rvalid);
    assert_eq!(sample.instr.rdata, 0xDEAD_BEEF);
    assert!(sample.instr.gnt);
    assert!(!sched.state().latches.get(Port::Instr).valid);
}

#[test]
fn test_data_read_completion_clears_only_data_port() {
    let mut core = PinCore::fetching(0x100);
    core.load(0x2000);
    let mut sched = Scheduler::new(core, MockTransport::new(), &unsynced());
    sched.init().unwrap();
    sched.step().unwrap();

    let sent = sched.transport().sent();
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        sent[0].kind,
        MessageKind::ReadRequest { req_id: RequestId::Instr, .. }
    ));
    assert!(matches!(
        sent[1].kind,
        MessageKind::ReadRequest { addr: 0x2000, req_id: RequestId::Data, len: 4 }
    ));

    sched
        .transport_mut()
        .push_inbound(Message::read_completion(4000, RequestId::Data, 0x1234));
    sched.core_mut().idle();
    sched.step().unwrap();

    let state = sched.state();
    assert!(state.tracker.is_outstanding(Channel::InstrFetch));
    assert!(!state.tracker.is_outstanding(Channel::DataRead));
    assert_eq!(state.latches.data.data, 0x1234);
    assert!(!sched.core().inputs.instr.gnt);
    assert!(sched.core().inputs.data.gnt);
}

// ============================================================================
// Scenario B: termination sentinel
// ============================================================================

#[test]
fn test_sentinel_write_ends_run() {
    let core = PinCore::storing(0x20008, 1, 0b1111);
    let mut sched = Scheduler::new(core, MockTransport::new(), &unsynced());
    sched.init().unwrap();

    assert_eq!(sched.step().unwrap(), Phase::Halted);
    assert!(sched.transport().sent().is_empty());
    assert!(sched.state().terminal);
    assert_eq!(sched.termination(), Some(Termination::Sentinel));
    assert_eq!(sched.ticks(), 0);
    assert!(sched.core().finalized);
    assert!(sched.transport().is_closed());
}

#[test]
fn test_sentinel_ignores_pending_requests() {
    let mut core = PinCore::fetching(0x100);
    core.store(0x1000, 0xAA, 0b1111);
    let mut sched = Scheduler::new(core, MockTransport::new(), &unsynced());
    sched.init().unwrap();
    sched.step().unwrap();
    assert_eq!(sched.state().tracker.outstanding_count(), 2);

    // Data port is busy with the posted write; the sentinel still counts.
    sched.core_mut().store(0x20008, 1, 0b1111);
    assert_eq!(sched.step().unwrap(), Phase::Halted);

    assert_eq!(sched.transport().sent().len(), 2);
    assert_eq!(sched.termination(), Some(Termination::Sentinel));
}

#[test]
fn test_custom_sentinel() {
    let config = BridgeConfigBuilder::new()
        .sync(false)
        .sentinel(0x4000, 0xC0DE)
        .build()
        .unwrap();

    let core = PinCore::storing(0x20008, 1, 0b1111);
    let mut sched = Scheduler::new(core, MockTransport::new(), &config);
    assert_eq!(sched.run_ticks(1).unwrap(), Phase::Running);
    assert_eq!(sched.transport().sent().len(), 1);

    sched.core_mut().store(0x4000, 0xC0DE, 0b1111);
    assert_eq!(sched.run().unwrap(), Termination::Sentinel);
}

// ============================================================================
// Scenario C: posted write
// ============================================================================

#[test]
fn test_byte_write_is_posted_and_acknowledged_locally() {
    let core = PinCore::storing(0x1000, 0x7F, 0b0001);
    let mut sched = Scheduler::new(core, MockTransport::new(), &unsynced());
    sched.init().unwrap();
    sched.step().unwrap();

    let sent = sched.transport().sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].kind {
        MessageKind::WritePosted { addr, req_id, data } => {
            assert_eq!(*addr, 0x1000);
            assert_eq!(*req_id, RequestId::DataWrite);
            assert_eq!(data.as_slice(), &[0x7F]);
        }
        other => panic!("expected a posted write, got {:?}", other),
    }
    assert!(sched.state().tracker.is_outstanding(Channel::DataWrite));
    assert!(!sched.core().inputs.data.gnt);

    sched.core_mut().idle();
    sched.step().unwrap();

    assert!(sched.state().latches.data.valid);
    assert!(!sched.state().tracker.is_outstanding(Channel::DataWrite));
    assert!(sched.core().inputs.data.rvalid);
    assert!(sched.core().inputs.data.gnt);

    // No wire traffic besides the write itself.
    assert_eq!(sched.transport().sent().len(), 1);
    assert_eq!(sched.stats().traffic.local_write_acks, 1);

    sched.step().unwrap();
    assert!(sched.core().last_sample().data.rvalid);
    assert!(!sched.state().latches.data.valid);
}

#[test]
fn test_halfword_write_length() {
    let core = PinCore::storing(0x1002, 0xABCD_1234, 0b0011);
    let mut sched = Scheduler::new(core, MockTransport::new(), &unsynced());
    sched.run_ticks(1).unwrap();

    let expected = MessageKind::WritePosted {
        addr: 0x1002,
        req_id: RequestId::DataWrite,
        data: Payload::from_word(0x1234, 2),
    };
    assert_eq!(sched.transport().sent()[0].kind, expected);
}

// ============================================================================
// Workloads against the loopback peer
// ============================================================================

fn loopback_run(workload: Vec<WorkloadOp>, synchronized: bool) -> (ScriptedCore, LoopbackTransport) {
    let config = BridgeConfigBuilder::new()
        .sync(synchronized)
        .latency(2000)
        .sync_interval(2000)
        .build()
        .unwrap();

    let mut memory = MemoryDevice::new(1000);
    memory.poke_word(0x100, 0xDEAD_BEEF);
    memory.poke_word(0x200, 0x0BAD_F00D);
    let link = LoopbackTransport::new(memory)
        .with_latency(config.link.latency)
        .with_sync_interval(config.link.sync_interval)
        .synchronized(synchronized);

    let mut sched = Scheduler::new(ScriptedCore::new(Workload::new(workload)), link, &config);
    assert_eq!(sched.run().unwrap(), Termination::Sentinel);
    sched.into_parts()
}

fn mixed_workload() -> Vec<WorkloadOp> {
    vec![
        WorkloadOp::Fetch { addr: 0x100 },
        WorkloadOp::Load { addr: 0x200 },
        WorkloadOp::Store {
            addr: 0x1000,
            value: 0xCAFE_F00D,
            size: 4,
        },
        WorkloadOp::Load { addr: 0x1000 },
        WorkloadOp::Store {
            addr: 0x1000,
            value: 0x1234_567F,
            size: 1,
        },
        WorkloadOp::Load { addr: 0x1000 },
    ]
}

#[test]
fn test_synchronized_workload() {
    let (core, link) = loopback_run(mixed_workload(), true);

    let data: Vec<u32> = core.responses().iter().map(|r| r.data).collect();
    assert_eq!(core.responses().len(), 6);
    assert_eq!(data[0], 0xDEAD_BEEF);
    assert_eq!(data[1], 0x0BAD_F00D);
    assert_eq!(data[3], 0xCAFE_F00D);
    assert_eq!(data[5], 0xCAFE_F07F);
    assert!(core.responses().iter().all(|r| !r.error));
    assert!(core.is_finalized());

    // The sentinel never reaches memory.
    assert_eq!(link.memory().peek(0x20008, 4), 0);
    assert_eq!(link.memory().stats().writes, 2);
}

#[test]
fn test_unsynchronized_workload() {
    let (core, link) = loopback_run(mixed_workload(), false);

    assert_eq!(core.responses().len(), 6);
    assert_eq!(core.responses()[5].data, 0xCAFE_F07F);
    assert_eq!(link.stats().syncs, 0);
}

#[test]
fn test_empty_workload_writes_sentinel_only() {
    let (core, link) = loopback_run(Vec::new(), true);
    assert!(core.responses().is_empty());
    assert_eq!(link.memory().stats().writes, 0);
}
