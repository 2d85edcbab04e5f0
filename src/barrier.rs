//! Time synchronization barrier.
//!
//! Before the clock advances the bridge flushes its outbound messages up to
//! the current time and, in synchronized mode, keeps draining inbound
//! messages until the memory side has provably moved past the current time.

use serde::Serialize;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::error::BridgeResult;
use crate::tracker::BridgeState;
use crate::translator::Translator;
use crate::transport::Transport;
use crate::types::SimTime;

/// Counters kept by the barrier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BarrierStats {
    /// Flushes rejected by the transport
    pub flush_failures: u64,
    /// Poll attempts made while draining
    pub drain_polls: u64,
    /// Drain iterations that found nothing to consume
    pub idle_spins: u64,
}

/// Flush and drain logic run once per tick.
#[derive(Clone, Debug)]
pub struct SyncBarrier {
    synchronized: bool,
    stats: BarrierStats,
}

impl SyncBarrier {
    /// Creates a barrier. In unsynchronized mode each drain polls once.
    pub fn new(synchronized: bool) -> Self {
        Self {
            synchronized,
            stats: BarrierStats::default(),
        }
    }

    /// Returns true in synchronized mode.
    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    /// Counters.
    pub fn stats(&self) -> &BarrierStats {
        &self.stats
    }

    /// Flushes outbound messages up to `now`.
    ///
    /// A failed flush is logged and counted; the next call retries it.
    pub fn flush<T: Transport + ?Sized>(&mut self, transport: &mut T, now: SimTime) {
        if let Err(e) = transport.out_sync(now) {
            self.stats.flush_failures += 1;
            warn!(time = now, error = %e, "outbound flush failed; retrying next tick");
        }
    }

    /// Consumes inbound messages due at `now`.
    ///
    /// Polls at least once. In synchronized mode it continues until the
    /// earliest unread message lies beyond `now`, the sentinel was seen, or
    /// cancellation was requested.
    pub fn drain<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        now: SimTime,
        translator: &mut Translator,
        state: &mut BridgeState,
        cancel: &CancelToken,
    ) -> BridgeResult<()> {
        loop {
            self.stats.drain_polls += 1;
            let consumed = translator.mem_to_core(transport, now, state)?;

            if !self.synchronized || state.terminal || cancel.is_cancelled() {
                return Ok(());
            }
            if cancel.take_status_request() {
                info!(
                    time = now,
                    next = ?transport.in_timestamp()?,
                    "status: waiting for the memory side"
                );
            }
            match transport.in_timestamp()? {
                Some(next) if next > now => return Ok(()),
                _ if !consumed => {
                    self.stats.idle_spins += 1;
                    std::hint::spin_loop();
                }
                _ => {}
            }
        }
    }
}
