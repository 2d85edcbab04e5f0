//! A scripted bus master standing in for a real core.
//!
//! `ScriptedCore` replays a [`Workload`] over the instruction and data ports
//! using the request/grant/valid handshake, one access at a time. On every
//! rising clock edge it:
//!
//! 1. moves a granted request to the waiting state and drops `req`,
//! 2. records the response of a waiting access once `rvalid` is seen,
//! 3. issues the next access when idle.
//!
//! After the last access it writes the termination sentinel, unless it was
//! built without one. A response carrying the error flag raises the major
//! bus alert.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::{debug, trace};

use crate::model::{CoreInputs, CoreModel, CoreOutputs, FETCH_ENABLE_ON};
use crate::types::Port;
use crate::workload::{Workload, WorkloadOp};

/// Default sentinel address written at the end of a workload.
pub const DEFAULT_SENTINEL_ADDR: u32 = 0x0002_0008;
/// Default sentinel value written at the end of a workload.
pub const DEFAULT_SENTINEL_VALUE: u32 = 1;

/// A completed access as observed by the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CoreResponse {
    /// The access that completed
    pub op: WorkloadOp,
    /// `rdata` sampled with `rvalid`
    pub data: u32,
    /// `err` sampled with `rvalid`
    pub error: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum BusState {
    Idle,
    Requesting(WorkloadOp),
    Waiting(WorkloadOp),
    Done,
}

/// Replays a list of accesses against the bridge.
#[derive(Debug)]
pub struct ScriptedCore {
    inputs: CoreInputs,
    outputs: CoreOutputs,
    ops: VecDeque<WorkloadOp>,
    sentinel: Option<WorkloadOp>,
    state: BusState,
    responses: Vec<CoreResponse>,
    prev_clk: bool,
    rising_edges: u64,
    finalized: bool,
}

impl ScriptedCore {
    /// Creates a core that runs `workload`, then writes the default sentinel.
    pub fn new(workload: Workload) -> Self {
        Self {
            inputs: CoreInputs::default(),
            outputs: CoreOutputs::default(),
            ops: workload.into_ops().into(),
            sentinel: Some(WorkloadOp::Store {
                addr: DEFAULT_SENTINEL_ADDR,
                value: DEFAULT_SENTINEL_VALUE,
                size: 4,
            }),
            state: BusState::Idle,
            responses: Vec::new(),
            prev_clk: false,
            rising_edges: 0,
            finalized: false,
        }
    }

    /// Replaces the sentinel written after the last access.
    pub fn with_sentinel(mut self, addr: u32, value: u32) -> Self {
        self.sentinel = Some(WorkloadOp::Store {
            addr,
            value,
            size: 4,
        });
        self
    }

    /// Goes to sleep after the last access instead of writing a sentinel.
    pub fn without_sentinel(mut self) -> Self {
        self.sentinel = None;
        self
    }

    /// Responses observed so far, in completion order.
    pub fn responses(&self) -> &[CoreResponse] {
        &self.responses
    }

    /// Returns true once every access, including the sentinel, was issued and
    /// no response is awaited.
    pub fn is_done(&self) -> bool {
        self.state == BusState::Done
    }

    /// Rising clock edges seen while out of reset.
    pub fn rising_edges(&self) -> u64 {
        self.rising_edges
    }

    /// Returns true once the bridge finalized the model.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    fn port_of(op: &WorkloadOp) -> Port {
        match op {
            WorkloadOp::Fetch { .. } => Port::Instr,
            WorkloadOp::Load { .. } | WorkloadOp::Store { .. } => Port::Data,
        }
    }

    fn drive(&mut self, op: &WorkloadOp) {
        match *op {
            WorkloadOp::Fetch { addr } => {
                self.outputs.instr_req = true;
                self.outputs.instr_addr = addr;
            }
            WorkloadOp::Load { addr } => {
                self.outputs.data_req = true;
                self.outputs.data_we = false;
                self.outputs.data_be = 0b1111;
                self.outputs.data_addr = addr;
            }
            WorkloadOp::Store { addr, value, size } => {
                self.outputs.data_req = true;
                self.outputs.data_we = true;
                self.outputs.data_be = byte_enable(size);
                self.outputs.data_addr = addr;
                self.outputs.data_wdata = value;
            }
        }
    }

    fn release(&mut self, port: Port) {
        match port {
            Port::Instr => self.outputs.instr_req = false,
            Port::Data => self.outputs.data_req = false,
        }
    }

    fn next_op(&mut self) -> Option<WorkloadOp> {
        self.ops.pop_front().or_else(|| self.sentinel.take())
    }

    fn on_rising_edge(&mut self) {
        self.rising_edges += 1;

        match std::mem::replace(&mut self.state, BusState::Idle) {
            BusState::Requesting(op) => {
                let port = Self::port_of(&op);
                if self.inputs.port(port).gnt {
                    trace!(?op, "request granted");
                    self.release(port);
                    self.state = BusState::Waiting(op);
                } else {
                    self.state = BusState::Requesting(op);
                }
            }
            BusState::Waiting(op) => {
                let pins = *self.inputs.port(Self::port_of(&op));
                if pins.rvalid {
                    debug!(?op, data = format_args!("{:#010x}", pins.rdata), error = pins.err, "response");
                    if pins.err {
                        self.outputs.alert_major_bus = true;
                    }
                    self.responses.push(CoreResponse {
                        op,
                        data: pins.rdata,
                        error: pins.err,
                    });
                } else {
                    self.state = BusState::Waiting(op);
                }
            }
            other => self.state = other,
        }

        if self.state == BusState::Idle {
            match self.next_op() {
                Some(op) => {
                    self.drive(&op);
                    self.state = BusState::Requesting(op);
                }
                None => {
                    self.state = BusState::Done;
                    self.outputs.core_sleep = true;
                }
            }
        }
    }
}

/// Byte enables for an access of `size` bytes at lane 0.
fn byte_enable(size: u8) -> u8 {
    match size {
        1 => 0b0001,
        2 => 0b0011,
        _ => 0b1111,
    }
}

impl CoreModel for ScriptedCore {
    fn inputs_mut(&mut self) -> &mut CoreInputs {
        &mut self.inputs
    }

    fn outputs(&self) -> &CoreOutputs {
        &self.outputs
    }

    fn eval(&mut self) {
        let rising = self.inputs.clk && !self.prev_clk;
        self.prev_clk = self.inputs.clk;

        if !self.inputs.rst_n {
            self.outputs.instr_req = false;
            self.outputs.data_req = false;
            return;
        }
        if rising && self.inputs.fetch_enable == FETCH_ENABLE_ON {
            self.on_rising_edge();
        }
    }

    fn finalize(&mut self) {
        self.finalized = true;
    }
}
