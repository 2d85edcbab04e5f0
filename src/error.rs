//! Errors raised by the bridge while stepping the cosimulation.

use thiserror::Error;

use crate::model::Alert;
use crate::scheduler::Phase;
use crate::transport::TransportError;
use crate::types::{Port, RequestId, SimTime};

/// Fatal bridge errors. Every variant ends the cosimulation.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The core raised one of its alert outputs.
    #[error("{alert} alert asserted by the core at time {time}")]
    Alert { alert: Alert, time: SimTime },

    /// Two read completions for the same port arrived before the core could
    /// observe the first one.
    #[error("second completion for the {port} port at time {time} before the first was observed")]
    DoubleCompletion { port: Port, time: SimTime },

    /// A read completion carried a request id with no read channel behind it.
    #[error("read completion tagged {req_id:?} at time {time} matches no read channel")]
    UnroutableCompletion { req_id: RequestId, time: SimTime },

    /// The transport failed in a way the bridge cannot recover from.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An operation was requested in a phase that does not allow it.
    #[error("cannot {operation} while the scheduler is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: Phase,
    },
}

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;
