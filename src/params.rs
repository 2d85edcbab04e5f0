//! Connection parameter strings.
//!
//! The first command-line argument names the memory side and the link
//! timing in one string:
//!
//! ```text
//! <scheme>:<address>[?key=value&...]
//! ```
//!
//! | Scheme     | Address              |
//! |------------|----------------------|
//! | `unix`     | socket path          |
//! | `tcp`      | `host:port`          |
//! | `loopback` | ignored, may be empty|
//!
//! Keys: `sync` (bool), `latency` and `sync_interval` (ns). Times are
//! stored in picoseconds. A key left out of the string leaves the
//! corresponding link setting of the configuration untouched.
//!
//! ```
//! use membridge::params::{ConnParams, Endpoint};
//!
//! let params: ConnParams = "unix:/tmp/mem.sock?latency=2&sync=false".parse().unwrap();
//! assert_eq!(params.endpoint, Endpoint::Unix("/tmp/mem.sock".into()));
//! assert_eq!(params.latency, Some(2000));
//! assert_eq!(params.sync, Some(false));
//! assert_eq!(params.sync_interval, None);
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::types::{SimTime, PS_PER_NS};

/// Errors in a connection parameter string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParamsError {
    #[error("missing scheme in '{0}' (expected unix:, tcp: or loopback:)")]
    MissingScheme(String),

    #[error("unknown scheme '{0}'")]
    UnknownScheme(String),

    #[error("scheme '{0}' requires an address")]
    MissingAddress(String),

    #[error("malformed option '{0}' (expected key=value)")]
    MalformedOption(String),

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("invalid value '{value}' for option '{key}'")]
    InvalidValue { key: String, value: String },
}

/// Where the memory side lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix domain socket path
    Unix(PathBuf),
    /// TCP `host:port`
    Tcp(String),
    /// In-process memory device
    Loopback,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(addr) => write!(f, "tcp:{}", addr),
            Endpoint::Loopback => write!(f, "loopback:"),
        }
    }
}

/// Parsed connection parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnParams {
    /// Memory side location
    pub endpoint: Endpoint,
    /// Synchronized mode, if given
    pub sync: Option<bool>,
    /// One-way link latency (ps), if given
    pub latency: Option<SimTime>,
    /// Maximum time between sync markers (ps), if given
    pub sync_interval: Option<SimTime>,
}

impl ConnParams {
    /// Parameters for `endpoint` with no timing overrides.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            sync: None,
            latency: None,
            sync_interval: None,
        }
    }

    fn apply_option(&mut self, option: &str) -> Result<(), ParamsError> {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| ParamsError::MalformedOption(option.to_string()))?;
        let invalid = || ParamsError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        };

        match key {
            "sync" => {
                self.sync = Some(match value {
                    "1" | "true" | "on" => true,
                    "0" | "false" | "off" => false,
                    _ => return Err(invalid()),
                })
            }
            "latency" => self.latency = Some(parse_ns(value).ok_or_else(invalid)?),
            "sync_interval" => self.sync_interval = Some(parse_ns(value).ok_or_else(invalid)?),
            _ => return Err(ParamsError::UnknownOption(key.to_string())),
        }
        Ok(())
    }
}

fn parse_ns(value: &str) -> Option<SimTime> {
    value.parse::<u64>().ok()?.checked_mul(PS_PER_NS)
}

impl FromStr for ConnParams {
    type Err = ParamsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (location, options) = match s.split_once('?') {
            Some((location, options)) => (location, Some(options)),
            None => (s, None),
        };
        let (scheme, address) = location
            .split_once(':')
            .ok_or_else(|| ParamsError::MissingScheme(s.to_string()))?;

        let endpoint = match scheme {
            "unix" | "tcp" if address.is_empty() => {
                return Err(ParamsError::MissingAddress(scheme.to_string()))
            }
            "unix" => Endpoint::Unix(PathBuf::from(address)),
            "tcp" => Endpoint::Tcp(address.to_string()),
            "loopback" => Endpoint::Loopback,
            other => return Err(ParamsError::UnknownScheme(other.to_string())),
        };

        let mut params = ConnParams::new(endpoint);
        for option in options.into_iter().flat_map(|o| o.split('&')) {
            if !option.is_empty() {
                params.apply_option(option)?;
            }
        }
        Ok(params)
    }
}
