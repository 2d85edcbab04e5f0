use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use signal_hook::consts::SIGINT;
#[cfg(unix)]
use signal_hook::consts::SIGUSR1;
use tracing::{error, info};

use membridge::model::ScriptedCore;
use membridge::workload::Workload;
use membridge::{
    init_logging, BridgeConfig, CancelToken, ConnParams, Endpoint, LoopbackTransport,
    MemoryDevice, Scheduler, StreamTransport, TracedTransport, Transport,
};

/// membridge - cycle-accurate core-to-memory cosimulation bridge
#[derive(Parser, Debug)]
#[command(name = "membridge")]
#[command(version)]
#[command(about = "Bridges a clocked core model to a timestamped memory transport", long_about = None)]
struct Args {
    /// Connection parameters: <unix|tcp|loopback>:<address>[?sync=..&latency=..&sync_interval=..]
    conn: String,

    /// Initial simulation timestamp (ps)
    start: Option<u64>,

    /// Core clock frequency (MHz)
    freq: Option<u64>,

    /// Bridge configuration file (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Accesses replayed by the scripted core (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    workload: Option<PathBuf>,

    /// Write every message sent and consumed as JSON lines
    #[arg(long, value_name = "FILE")]
    trace_file: Option<PathBuf>,

    /// Write run statistics as JSON
    #[arg(long, value_name = "FILE")]
    stats_file: Option<PathBuf>,

    /// Log level, overridden by RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let (params, config) = match resolve(&args) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("membridge: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(args.log_level.as_deref().unwrap_or(&config.log_level));
    if let Err(e) = config.validate() {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(&args, &params, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parses the connection string and layers arguments over the config file.
///
/// The merged configuration is validated by the caller once logging is up.
fn resolve(args: &Args) -> anyhow::Result<(ConnParams, BridgeConfig)> {
    let params: ConnParams = args
        .conn
        .parse()
        .with_context(|| format!("invalid connection parameters '{}'", args.conn))?;

    let mut config = match &args.config {
        Some(path) => BridgeConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config.apply_params(&params);
    if let Some(start) = args.start {
        config.clock.start_time = start;
    }
    if let Some(freq) = args.freq {
        config.clock.set_frequency_mhz(freq)?;
    }

    Ok((params, config))
}

fn connect(params: &ConnParams, config: &BridgeConfig) -> anyhow::Result<Box<dyn Transport>> {
    let link = &config.link;
    let transport: Box<dyn Transport> = match &params.endpoint {
        #[cfg(unix)]
        Endpoint::Unix(path) => Box::new(
            StreamTransport::connect_unix(path)
                .with_context(|| format!("failed to connect to {}", path.display()))?
                .with_latency(link.latency)
                .with_sync_interval(link.sync_interval)
                .with_capacity(link.capacity)
                .synchronized(link.sync),
        ),
        #[cfg(not(unix))]
        Endpoint::Unix(_) => anyhow::bail!("unix sockets are not supported on this platform"),
        Endpoint::Tcp(addr) => Box::new(
            StreamTransport::connect_tcp(addr.as_str())
                .with_context(|| format!("failed to connect to {}", addr))?
                .with_latency(link.latency)
                .with_sync_interval(link.sync_interval)
                .with_capacity(link.capacity)
                .synchronized(link.sync),
        ),
        Endpoint::Loopback => {
            let mut memory = MemoryDevice::new(config.memory.latency);
            if let Some(image) = &config.memory.image {
                memory
                    .load_image(image, config.memory.image_base)
                    .with_context(|| format!("failed to load {}", image.display()))?;
            }
            Box::new(
                LoopbackTransport::new(memory)
                    .with_latency(link.latency)
                    .with_sync_interval(link.sync_interval)
                    .with_capacity(link.capacity)
                    .synchronized(link.sync),
            )
        }
    };
    Ok(transport)
}

fn run(args: &Args, params: &ConnParams, config: &BridgeConfig) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    signal_hook::flag::register(SIGINT, cancel.interrupt_flag())?;
    #[cfg(unix)]
    signal_hook::flag::register(SIGUSR1, cancel.status_flag())?;

    let workload = match &args.workload {
        Some(path) => Workload::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Workload::default(),
    };
    info!(ops = workload.len(), endpoint = %params.endpoint, "starting");
    let core = ScriptedCore::new(workload).with_sentinel(config.sentinel.addr, config.sentinel.value);

    let mut transport = connect(params, config)?;
    if let Some(path) = &args.trace_file {
        transport = Box::new(
            TracedTransport::create(transport, path)
                .with_context(|| format!("failed to create {}", path.display()))?,
        );
    }

    let mut sched = Scheduler::new(core, transport, config).with_cancel_token(cancel);
    let outcome = sched.run();

    let stats = sched.stats();
    if let Some(path) = &args.stats_file {
        stats
            .to_json_file(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    stats.write_summary(std::io::stderr())?;

    let termination = outcome?;
    info!(%termination, time = sched.now(), "finished");
    Ok(())
}
