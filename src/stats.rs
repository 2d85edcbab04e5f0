//! Statistics collection and export for the bridge.
//!
//! [`BridgeStats`] gathers the translator and barrier counters together with
//! the final timeline position and wall-clock timing, and exports them as
//! JSON, CSV or a human-readable summary.

use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::barrier::BarrierStats;
use crate::translator::TranslatorStats;
use crate::types::SimTime;

/// Aggregate statistics for one cosimulation run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct BridgeStats {
    /// Simulation time when the statistics were taken
    pub final_time: SimTime,

    /// Full clock cycles executed
    pub ticks: u64,

    /// Why the run ended, if it has
    pub termination: Option<String>,

    /// Request and completion counters
    pub traffic: TranslatorStats,

    /// Flush and drain counters
    pub sync: BarrierStats,

    /// Wall-clock timing
    pub timing: TimingStats,
}

/// Timing/performance statistics.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TimingStats {
    /// Total wall-clock time in milliseconds
    pub total_wall_time_ms: f64,

    /// Simulated picoseconds per wall-clock second
    pub sim_time_per_second: f64,

    /// Ticks executed per wall-clock second
    pub ticks_per_second: f64,
}

impl BridgeStats {
    /// Updates timing statistics based on wall clock time.
    pub fn compute_timing(&mut self, simulated: SimTime, wall_time_ms: f64) {
        self.timing.total_wall_time_ms = wall_time_ms;

        if wall_time_ms > 0.0 {
            let seconds = wall_time_ms / 1000.0;
            self.timing.sim_time_per_second = simulated as f64 / seconds;
            self.timing.ticks_per_second = self.ticks as f64 / seconds;
        }
    }

    /// Exports statistics to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Exports statistics to JSON file.
    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = self.to_json().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e)
        })?;
        std::fs::write(path, json)
    }

    /// Exports the counters to CSV.
    pub fn to_csv(&self) -> String {
        let t = &self.traffic;
        let s = &self.sync;
        let rows: [(&str, u64); 14] = [
            ("final_time", self.final_time),
            ("ticks", self.ticks),
            ("instr_reads", t.instr_reads),
            ("data_reads", t.data_reads),
            ("posted_writes", t.posted_writes),
            ("instr_completions", t.instr_completions),
            ("data_completions", t.data_completions),
            ("local_write_acks", t.local_write_acks),
            ("backpressure_stalls", t.backpressure_stalls),
            ("unsupported_messages", t.unsupported_messages),
            ("ignored_messages", t.ignored_messages),
            ("flush_failures", s.flush_failures),
            ("drain_polls", s.drain_polls),
            ("idle_spins", s.idle_spins),
        ];

        let mut csv = String::from("metric,value\n");
        for (name, value) in rows {
            csv.push_str(&format!("{},{}\n", name, value));
        }
        csv.push_str(&format!("wall_time_ms,{:.2}\n", self.timing.total_wall_time_ms));
        csv
    }

    /// Writes a human-readable summary to a writer.
    pub fn write_summary<W: Write>(&self, mut w: W) -> std::io::Result<()> {
        let t = &self.traffic;

        writeln!(w, "=== Bridge Statistics ===")?;
        writeln!(w)?;
        writeln!(w, "Final simulation time: {} ps", self.final_time)?;
        writeln!(w, "Ticks: {}", self.ticks)?;
        if let Some(ref reason) = self.termination {
            writeln!(w, "Terminated by: {}", reason)?;
        }
        writeln!(w)?;

        writeln!(w, "--- Traffic ---")?;
        writeln!(w, "Instruction reads: {} sent, {} completed", t.instr_reads, t.instr_completions)?;
        writeln!(w, "Data reads: {} sent, {} completed", t.data_reads, t.data_completions)?;
        writeln!(w, "Posted writes: {} sent, {} acknowledged", t.posted_writes, t.local_write_acks)?;
        writeln!(w, "Backpressure stalls: {}", t.backpressure_stalls)?;
        writeln!(w, "Unsupported messages: {}", t.unsupported_messages)?;
        writeln!(w)?;

        writeln!(w, "--- Synchronization ---")?;
        writeln!(w, "Flush failures: {}", self.sync.flush_failures)?;
        writeln!(w, "Drain polls: {} ({} idle)", self.sync.drain_polls, self.sync.idle_spins)?;
        writeln!(w)?;

        writeln!(w, "--- Timing ---")?;
        writeln!(w, "Wall time: {:.2} ms", self.timing.total_wall_time_ms)?;
        writeln!(w, "Ticks/sec: {:.2}", self.timing.ticks_per_second)?;

        Ok(())
    }

    /// Returns a summary string.
    pub fn summary(&self) -> String {
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.write_summary(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// A simple timer for measuring wall-clock time.
#[derive(Debug)]
pub struct Timer {
    start: std::time::Instant,
}

impl Timer {
    /// Starts a new timer.
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Returns elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
