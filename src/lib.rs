//! # membridge
//!
//! A cycle-accurate bridge between a clocked processor-core model and a
//! memory subsystem reached through an asynchronous, timestamped message
//! transport.
//!
//! ## Design Principles
//!
//! - **One Timeline**: The scheduler's clock, every message timestamp and
//!   every link latency share one picosecond `SimTime`.
//! - **Single Outstanding Request**: Each channel (instruction fetch, data
//!   read, posted data write) has at most one request in flight; grants are
//!   the negation of the outstanding state.
//! - **Barrier Before Edge**: Outbound messages are flushed and inbound
//!   completions drained up to the current time before the clock advances.
//! - **Delayed Responses**: Completions are latched and driven onto the core
//!   pins between edges, so the core samples them on the next rising edge.
//!
//! ## Quick Start
//!
//! ```rust
//! use membridge::{BridgeConfigBuilder, LoopbackTransport, MemoryDevice, Scheduler, Termination};
//! use membridge::model::ScriptedCore;
//! use membridge::workload::{Workload, WorkloadOp};
//!
//! let config = BridgeConfigBuilder::new().latency(2000).build().unwrap();
//!
//! let mut memory = MemoryDevice::new(0);
//! memory.poke_word(0x100, 0xDEAD_BEEF);
//! let link = LoopbackTransport::new(memory).with_latency(config.link.latency);
//!
//! let core = ScriptedCore::new(Workload::new(vec![WorkloadOp::Fetch { addr: 0x100 }]));
//!
//! let mut sched = Scheduler::new(core, link, &config);
//! assert_eq!(sched.run().unwrap(), Termination::Sentinel);
//! assert_eq!(sched.core().responses()[0].data, 0xDEAD_BEEF);
//! ```
//!
//! ## Configuration-Driven Setup
//!
//! ```rust,ignore
//! use membridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::from_file("bridge.yaml")?;
//! ```

pub mod types;
pub mod message;
pub mod tracker;
pub mod translator;
pub mod barrier;
pub mod cancel;
pub mod error;
pub mod model;
pub mod transport;
pub mod memory;
pub mod scheduler;
pub mod config;
pub mod params;
pub mod workload;
pub mod stats;

// Re-export commonly used types
pub use types::{Channel, Port, RequestId, SimTime, PS_PER_NS};
pub use message::{Message, MessageKind, Payload};
pub use tracker::{BridgeState, DelayedResponse, RequestTracker, ResponseLatches};
pub use translator::{Translator, TranslatorStats};
pub use barrier::{BarrierStats, SyncBarrier};
pub use cancel::CancelToken;
pub use error::{BridgeError, BridgeResult};
pub use model::{Alert, CoreInputs, CoreModel, CoreOutputs};
pub use transport::{
    LoopbackTransport, MockTransport, OutSlot, StreamTransport, TracedTransport, Transport,
    TransportError, TransportResult,
};
pub use memory::MemoryDevice;
pub use scheduler::{Phase, Scheduler, Termination};
pub use config::{BridgeConfig, BridgeConfigBuilder, ConfigError, ConfigResult};
pub use params::{ConnParams, Endpoint, ParamsError};
pub use stats::{BridgeStats, Timer};

/// Initialize the tracing subscriber for logging.
///
/// Call this at the start of your program to enable logging. `RUST_LOG`
/// takes precedence over `level`.
///
/// # Example
///
/// ```rust,ignore
/// membridge::init_logging("info");
/// ```
pub fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();
}
