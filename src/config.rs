//! Configuration system for the bridge.
//!
//! This module provides YAML/JSON configuration file support. Command-line
//! arguments and connection parameters are applied on top of the loaded file.
//!
//! # Configuration File Structure
//!
//! ```yaml
//! clock:
//!   start_time: 0
//!   period_ps: 4000
//!
//! link:
//!   sync: true
//!   latency: 500000
//!   sync_interval: 500000
//!   capacity: 32
//!
//! core:
//!   boot_addr: 1048704
//!   hart_id: 0
//!
//! sentinel:
//!   addr: 131080
//!   value: 1
//!
//! memory:
//!   latency: 0
//!   image: firmware.bin
//!   image_base: 1048576
//!
//! log_level: info
//! ```
//!
//! All times are in picoseconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::params::ConnParams;
use crate::types::SimTime;

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown file format: {0}")]
    UnknownFormat(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Clock and timeline parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Initial simulation time
    #[serde(default)]
    pub start_time: SimTime,

    /// Full clock period
    #[serde(default = "default_period")]
    pub period_ps: SimTime,
}

fn default_period() -> SimTime {
    4000
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start_time: 0,
            period_ps: default_period(),
        }
    }
}

impl ClockConfig {
    /// Time advanced after each clock edge.
    pub fn half_period(&self) -> SimTime {
        self.period_ps / 2
    }

    /// Sets the period from a frequency in MHz.
    ///
    /// The half period is `500000 / freq` picoseconds (integer division).
    pub fn set_frequency_mhz(&mut self, freq: u64) -> ConfigResult<()> {
        if freq == 0 {
            return Err(ConfigError::Validation(
                "Clock frequency must be non-zero".to_string(),
            ));
        }
        let half = 500_000 / freq;
        if half == 0 {
            return Err(ConfigError::Validation(format!(
                "Clock frequency {} MHz is above the 1 ps resolution",
                freq
            )));
        }
        self.period_ps = half * 2;
        Ok(())
    }
}

/// Link timing and capacity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Synchronized mode: drain until the far end has caught up
    #[serde(default = "default_true")]
    pub sync: bool,

    /// One-way latency
    #[serde(default = "default_link_time")]
    pub latency: SimTime,

    /// Maximum time between sync markers
    #[serde(default = "default_link_time")]
    pub sync_interval: SimTime,

    /// Outbound messages in flight before allocation fails
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_link_time() -> SimTime {
    500_000
}

fn default_capacity() -> usize {
    32
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            sync: true,
            latency: default_link_time(),
            sync_interval: default_link_time(),
            capacity: default_capacity(),
        }
    }
}

/// Static core inputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Reset vector base
    #[serde(default = "default_boot_addr")]
    pub boot_addr: u32,

    /// Hart identifier
    #[serde(default)]
    pub hart_id: u32,
}

fn default_boot_addr() -> u32 {
    0x0010_0080
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            boot_addr: default_boot_addr(),
            hart_id: 0,
        }
    }
}

/// The posted write that ends the cosimulation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default = "default_sentinel_addr")]
    pub addr: u32,

    #[serde(default = "default_sentinel_value")]
    pub value: u32,
}

fn default_sentinel_addr() -> u32 {
    0x0002_0008
}

fn default_sentinel_value() -> u32 {
    1
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            addr: default_sentinel_addr(),
            value: default_sentinel_value(),
        }
    }
}

/// The in-process memory used by loopback connections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Access latency
    #[serde(default)]
    pub latency: SimTime,

    /// Raw binary loaded before the first tick
    #[serde(default)]
    pub image: Option<PathBuf>,

    /// Load address of the image
    #[serde(default)]
    pub image_base: u64,
}

/// Complete bridge configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub clock: ClockConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub sentinel: SentinelConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            link: LinkConfig::default(),
            core: CoreConfig::default(),
            sentinel: SentinelConfig::default(),
            memory: MemoryConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl BridgeConfig {
    /// Creates a configuration with every default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let config: BridgeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Loads configuration from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let config: BridgeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml_file(path),
            "json" => Self::from_json_file(path),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Overrides the link settings given in the connection parameters.
    ///
    /// Keys absent from the connection string keep their configured value.
    pub fn apply_params(&mut self, params: &ConnParams) {
        if let Some(sync) = params.sync {
            self.link.sync = sync;
        }
        if let Some(latency) = params.latency {
            self.link.latency = latency;
        }
        if let Some(interval) = params.sync_interval {
            self.link.sync_interval = interval;
        }
    }

    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.clock.half_period() == 0 {
            return Err(ConfigError::Validation(format!(
                "Clock period {} ps leaves no half period",
                self.clock.period_ps
            )));
        }
        if self.link.capacity == 0 {
            return Err(ConfigError::Validation(
                "Link capacity must be at least 1".to_string(),
            ));
        }
        if self.link.sync {
            if self.link.latency == 0 {
                return Err(ConfigError::Validation(
                    "Synchronized links need a non-zero latency".to_string(),
                ));
            }
            if self.link.sync_interval == 0 {
                return Err(ConfigError::Validation(
                    "Synchronized links need a non-zero sync interval".to_string(),
                ));
            }
        }

        for warning in self.warnings() {
            tracing::warn!("{}", warning);
        }

        Ok(())
    }

    /// Settings that are accepted but probably not what was meant.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.clock.period_ps % 2 != 0 {
            warnings.push(format!(
                "Clock period {} ps is odd; each half period is truncated to {} ps",
                self.clock.period_ps,
                self.clock.half_period()
            ));
        }
        if self.sentinel.addr % 4 != 0 {
            warnings.push(format!(
                "Sentinel address {:#x} is not word aligned",
                self.sentinel.addr
            ));
        }
        warnings
    }

    /// Saves configuration to a YAML file.
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Converts to YAML string.
    pub fn to_yaml(&self) -> ConfigResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Converts to JSON string.
    pub fn to_json(&self) -> ConfigResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Builder for creating a BridgeConfig programmatically.
#[derive(Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
    frequency_mhz: Option<u64>,
}

impl BridgeConfigBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial simulation time.
    pub fn start_time(mut self, time: SimTime) -> Self {
        self.config.clock.start_time = time;
        self
    }

    /// Sets the clock period.
    pub fn period_ps(mut self, period: SimTime) -> Self {
        self.config.clock.period_ps = period;
        self.frequency_mhz = None;
        self
    }

    /// Sets the clock period from a frequency, checked in `build`.
    pub fn frequency_mhz(mut self, freq: u64) -> Self {
        self.frequency_mhz = Some(freq);
        self
    }

    /// Enables or disables synchronized mode.
    pub fn sync(mut self, enabled: bool) -> Self {
        self.config.link.sync = enabled;
        self
    }

    /// Sets the one-way link latency.
    pub fn latency(mut self, latency: SimTime) -> Self {
        self.config.link.latency = latency;
        self
    }

    /// Sets the sync interval.
    pub fn sync_interval(mut self, interval: SimTime) -> Self {
        self.config.link.sync_interval = interval;
        self
    }

    /// Sets the outbound capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.link.capacity = capacity;
        self
    }

    /// Sets the boot address.
    pub fn boot_addr(mut self, addr: u32) -> Self {
        self.config.core.boot_addr = addr;
        self
    }

    /// Sets the hart id.
    pub fn hart_id(mut self, id: u32) -> Self {
        self.config.core.hart_id = id;
        self
    }

    /// Sets the termination sentinel.
    pub fn sentinel(mut self, addr: u32, value: u32) -> Self {
        self.config.sentinel = SentinelConfig { addr, value };
        self
    }

    /// Sets the loopback memory latency.
    pub fn memory_latency(mut self, latency: SimTime) -> Self {
        self.config.memory.latency = latency;
        self
    }

    /// Sets the loopback memory image.
    pub fn memory_image(mut self, path: impl Into<PathBuf>, base: u64) -> Self {
        self.config.memory.image = Some(path.into());
        self.config.memory.image_base = base;
        self
    }

    /// Sets the log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Builds and validates the configuration.
    pub fn build(mut self) -> ConfigResult<BridgeConfig> {
        if let Some(freq) = self.frequency_mhz {
            self.config.clock.set_frequency_mhz(freq)?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}
