//! Hello Loopback Example
//!
//! This example runs a scripted core against the in-process memory peer:
//! - Instruction fetches served from a preloaded program
//! - A posted store followed by a load of the same word
//! - Termination by the sentinel write
//!
//! Run with: `cargo run --example hello_loopback`

use membridge::model::ScriptedCore;
use membridge::workload::{Workload, WorkloadOp};
use membridge::{
    init_logging, BridgeConfigBuilder, LoopbackTransport, MemoryDevice, Scheduler, TracedTransport,
};

// ============================================================================
// Configuration
// ============================================================================

const BOOT_ADDR: u32 = 0x0010_0080;
const SCRATCH_ADDR: u32 = 0x1000;
const LINK_LATENCY: u64 = 2_000; // 2 ns
const MEMORY_LATENCY: u64 = 10_000; // 10 ns

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let config = BridgeConfigBuilder::new()
        .frequency_mhz(250)
        .latency(LINK_LATENCY)
        .sync_interval(LINK_LATENCY)
        .memory_latency(MEMORY_LATENCY)
        .build()?;

    // A few RISC-V instructions at the boot address.
    let mut memory = MemoryDevice::new(config.memory.latency);
    for (i, insn) in [0x0000_0013u32, 0x0010_0093, 0x0020_0113, 0x0000_006F]
        .iter()
        .enumerate()
    {
        memory.poke_word(u64::from(BOOT_ADDR) + 4 * i as u64, *insn);
    }

    let workload = Workload::new(vec![
        WorkloadOp::Fetch { addr: BOOT_ADDR },
        WorkloadOp::Fetch { addr: BOOT_ADDR + 4 },
        WorkloadOp::Fetch { addr: BOOT_ADDR + 8 },
        WorkloadOp::Store {
            addr: SCRATCH_ADDR,
            value: 0x1234_5678,
            size: 4,
        },
        WorkloadOp::Load { addr: SCRATCH_ADDR },
        WorkloadOp::Fetch { addr: BOOT_ADDR + 12 },
    ]);

    let link = LoopbackTransport::new(memory)
        .with_latency(config.link.latency)
        .with_sync_interval(config.link.sync_interval);
    let link = TracedTransport::new(link, Vec::new());
    let core = ScriptedCore::new(workload);

    let mut sched = Scheduler::new(core, link, &config);
    let termination = sched.run()?;

    println!("=== Hello Loopback ===");
    println!("Terminated by {} at {} ps", termination, sched.now());
    println!();
    for response in sched.core().responses() {
        println!("  {:?} -> {:#010x}", response.op, response.data);
    }
    println!();
    print!("{}", sched.stats().summary());

    let (_, traced) = sched.into_parts();
    let (_, trace) = traced.into_parts();
    println!();
    println!("--- Message trace ---");
    print!("{}", String::from_utf8_lossy(&trace));

    Ok(())
}
