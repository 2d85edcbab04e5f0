//! Cooperative cancellation and status requests.
//!
//! Process signals only flip atomic flags; the scheduler checks them at the
//! top of each tick and on every drain iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flags checked by the scheduler.
///
/// Clones share the same flags.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    interrupt: Arc<AtomicBool>,
    status: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token with no request pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a graceful shutdown.
    pub fn cancel(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    /// Returns true once a shutdown was requested.
    pub fn is_cancelled(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// Requests a one-off status dump.
    pub fn request_status(&self) {
        self.status.store(true, Ordering::SeqCst);
    }

    /// Returns true, and clears the request, if a status dump is pending.
    pub fn take_status_request(&self) -> bool {
        self.status.swap(false, Ordering::SeqCst)
    }

    /// The shutdown flag, for registration with a signal handler.
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// The status flag, for registration with a signal handler.
    pub fn status_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.status)
    }
}
