//! The cosimulation scheduler.
//!
//! The `Scheduler` owns the core model, the transport and all bridge state,
//! and advances the shared timeline one clock cycle per [`step`].
//!
//! # Tick Order
//!
//! ```text
//! status dump? -> stop? -> flush(now) -> core_to_mem -> drain(now) -> stop?
//!   -> rising edge, eval, alerts, now += half
//!   -> drive latches and grants
//!   -> falling edge, eval, alerts, now += half
//! ```
//!
//! Latches and grants are driven between the two edges, so the core samples
//! a completion on the rising edge of the following tick.
//!
//! # Lifecycle
//!
//! `Init -> Running -> Terminating -> Halted`. A fatal error also passes
//! through `Terminating`, so the core is finalized and the transport closed
//! however the run ends.
//!
//! [`step`]: Scheduler::step

use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

use crate::barrier::SyncBarrier;
use crate::cancel::CancelToken;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::model::{CoreModel, PortInputs, FETCH_ENABLE_ON};
use crate::stats::{BridgeStats, Timer};
use crate::tracker::BridgeState;
use crate::translator::Translator;
use crate::transport::Transport;
use crate::types::{Port, SimTime};

/// Scheduler lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Created, core not yet reset
    Init,
    /// Stepping ticks
    Running,
    /// Finalizing the core and closing the transport
    Terminating,
    /// Done; further steps are rejected
    Halted,
}

/// Why a run ended without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Termination {
    /// The core wrote the termination sentinel
    Sentinel,
    /// Cancellation was requested
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Sentinel => write!(f, "sentinel"),
            Termination::Interrupted => write!(f, "interrupt"),
        }
    }
}

/// Drives a core model against a memory transport.
pub struct Scheduler<C, T> {
    core: C,
    transport: T,
    state: BridgeState,
    translator: Translator,
    barrier: SyncBarrier,
    cancel: CancelToken,
    start_time: SimTime,
    now: SimTime,
    half_period: SimTime,
    boot_addr: u32,
    hart_id: u32,
    phase: Phase,
    termination: Option<Termination>,
    ticks: u64,
    timer: Option<Timer>,
    wall_time_ms: Option<f64>,
}

impl<C: CoreModel, T: Transport> Scheduler<C, T> {
    /// Creates a scheduler in the `Init` phase.
    ///
    /// `config` is expected to be validated.
    pub fn new(core: C, transport: T, config: &BridgeConfig) -> Self {
        Self {
            core,
            transport,
            state: BridgeState::new(),
            translator: Translator::new(config.sentinel.addr, config.sentinel.value),
            barrier: SyncBarrier::new(config.link.sync),
            cancel: CancelToken::new(),
            start_time: config.clock.start_time,
            now: config.clock.start_time,
            half_period: config.clock.half_period(),
            boot_addr: config.core.boot_addr,
            hart_id: config.core.hart_id,
            phase: Phase::Init,
            termination: None,
            ticks: 0,
            timer: None,
            wall_time_ms: None,
        }
    }

    /// Replaces the cancellation token.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle sharing this scheduler's cancellation flags.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current simulation time.
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Full cycles executed.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Why the run ended, once it has.
    pub fn termination(&self) -> Option<Termination> {
        self.termination
    }

    /// Tracker, latches and terminal flag.
    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// The core model.
    pub fn core(&self) -> &C {
        &self.core
    }

    /// The core model, mutably.
    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the scheduler, returning the core and the transport.
    pub fn into_parts(self) -> (C, T) {
        (self.core, self.transport)
    }

    /// Drives the reset sequence and enters `Running`.
    pub fn init(&mut self) -> BridgeResult<()> {
        self.expect_phase(Phase::Init, "initialize")?;

        let inputs = self.core.inputs_mut();
        inputs.clk = false;
        inputs.rst_n = false;
        inputs.scan_rst_n = true;
        inputs.hart_id = self.hart_id;
        inputs.boot_addr = self.boot_addr;
        inputs.fetch_enable = FETCH_ENABLE_ON;
        inputs.instr = PortInputs::default();
        inputs.data = PortInputs::default();
        self.core.eval();

        self.core.inputs_mut().clk = true;
        self.core.eval();

        let inputs = self.core.inputs_mut();
        inputs.clk = false;
        inputs.rst_n = true;
        inputs.instr.gnt = true;
        inputs.data.gnt = true;

        self.phase = Phase::Running;
        self.timer = Some(Timer::start());
        info!(
            time = self.now,
            half_period = self.half_period,
            synchronized = self.barrier.is_synchronized(),
            "core out of reset"
        );
        Ok(())
    }

    /// Executes one tick and returns the phase afterwards.
    ///
    /// A stop condition detected during the tick runs the shutdown sequence
    /// immediately, so the returned phase is then `Halted`.
    pub fn step(&mut self) -> BridgeResult<Phase> {
        match self.phase {
            Phase::Running => {}
            Phase::Terminating => {
                self.shutdown()?;
                return Ok(self.phase);
            }
            phase => {
                return Err(BridgeError::InvalidPhase {
                    operation: "step",
                    phase,
                })
            }
        }

        match self.tick() {
            Ok(()) => Ok(self.phase),
            Err(e) => {
                error!(time = self.now, error = %e, "cosimulation failed");
                self.abort();
                Err(e)
            }
        }
    }

    /// Runs until the sentinel or an interrupt ends the cosimulation.
    ///
    /// Initializes first if needed.
    pub fn run(&mut self) -> BridgeResult<Termination> {
        if self.phase == Phase::Init {
            self.init()?;
        }
        while self.step()? != Phase::Halted {}
        Ok(self.termination.unwrap_or(Termination::Interrupted))
    }

    /// Runs at most `n` ticks and returns the phase afterwards.
    ///
    /// Initializes first if needed.
    pub fn run_ticks(&mut self, n: u64) -> BridgeResult<Phase> {
        if self.phase == Phase::Init {
            self.init()?;
        }
        for _ in 0..n {
            if self.step()? == Phase::Halted {
                break;
            }
        }
        Ok(self.phase)
    }

    /// Snapshot of the run statistics.
    pub fn stats(&self) -> BridgeStats {
        let mut stats = BridgeStats {
            final_time: self.now,
            ticks: self.ticks,
            termination: self.termination.map(|t| t.to_string()),
            traffic: self.translator.stats().clone(),
            sync: self.barrier.stats().clone(),
            ..Default::default()
        };
        let wall_ms = self
            .wall_time_ms
            .or_else(|| self.timer.as_ref().map(Timer::elapsed_ms))
            .unwrap_or(0.0);
        stats.compute_timing(self.now - self.start_time, wall_ms);
        stats
    }

    fn tick(&mut self) -> BridgeResult<()> {
        if self.cancel.take_status_request() {
            self.dump_status();
        }
        if self.stop_requested() {
            return self.shutdown();
        }

        self.barrier.flush(&mut self.transport, self.now);
        self.translator
            .core_to_mem(&mut self.transport, self.now, self.core.outputs(), &mut self.state)?;
        self.barrier.drain(
            &mut self.transport,
            self.now,
            &mut self.translator,
            &mut self.state,
            &self.cancel,
        )?;
        if self.stop_requested() {
            return self.shutdown();
        }

        // A request that hit backpressure must not look accepted.
        for port in [Port::Instr, Port::Data] {
            if self.state.is_stalled(port) {
                self.core.inputs_mut().port_mut(port).gnt = false;
            }
        }

        self.edge(true)?;
        self.drive_responses();
        self.edge(false)?;

        self.ticks += 1;
        Ok(())
    }

    fn edge(&mut self, level: bool) -> BridgeResult<()> {
        self.core.inputs_mut().clk = level;
        self.core.eval();
        if let Some(alert) = self.core.outputs().asserted_alert() {
            return Err(BridgeError::Alert {
                alert,
                time: self.now,
            });
        }
        self.now += self.half_period;
        Ok(())
    }

    fn drive_responses(&mut self) {
        for port in [Port::Instr, Port::Data] {
            let latch = *self.state.latches.get(port);
            let grant = self.state.tracker.grant(port);
            let pins = self.core.inputs_mut().port_mut(port);
            pins.rvalid = latch.valid;
            pins.rdata = latch.data;
            pins.err = latch.error;
            pins.gnt = grant;
        }
    }

    fn stop_requested(&mut self) -> bool {
        if self.state.terminal {
            self.termination = Some(Termination::Sentinel);
        } else if self.cancel.is_cancelled() {
            self.termination = Some(Termination::Interrupted);
        }
        self.termination.is_some()
    }

    fn shutdown(&mut self) -> BridgeResult<()> {
        self.phase = Phase::Terminating;
        info!(
            time = self.now,
            ticks = self.ticks,
            reason = %self.termination.unwrap_or(Termination::Interrupted),
            "cosimulation ending"
        );
        self.core.finalize();
        let closed = self.transport.close();
        self.halt();
        closed.map_err(BridgeError::from)
    }

    fn abort(&mut self) {
        self.phase = Phase::Terminating;
        self.core.finalize();
        if let Err(e) = self.transport.close() {
            warn!(error = %e, "transport close failed during abort");
        }
        self.halt();
    }

    fn halt(&mut self) {
        self.wall_time_ms = self.timer.as_ref().map(Timer::elapsed_ms);
        self.phase = Phase::Halted;
    }

    fn dump_status(&self) {
        info!(
            time = self.now,
            ticks = self.ticks,
            outstanding = self.state.tracker.outstanding_count(),
            "status"
        );
    }

    fn expect_phase(&self, expected: Phase, operation: &'static str) -> BridgeResult<()> {
        if self.phase != expected {
            return Err(BridgeError::InvalidPhase {
                operation,
                phase: self.phase,
            });
        }
        Ok(())
    }
}
