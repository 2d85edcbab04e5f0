//! Workload files consumed by [`ScriptedCore`](crate::model::ScriptedCore).
//!
//! A workload is a flat list of accesses:
//!
//! ```yaml
//! - op: fetch
//!   addr: 1048704
//! - op: store
//!   addr: 4096
//!   value: 127
//!   size: 1
//! - op: load
//!   addr: 4096
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{ConfigError, ConfigResult};

/// One memory access.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WorkloadOp {
    /// Instruction fetch of one word
    Fetch { addr: u32 },
    /// Data load of one word
    Load { addr: u32 },
    /// Posted data store of `size` bytes (1, 2 or 4)
    Store {
        addr: u32,
        value: u32,
        #[serde(default = "default_store_size")]
        size: u8,
    },
}

fn default_store_size() -> u8 {
    4
}

/// An ordered list of accesses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workload {
    ops: Vec<WorkloadOp>,
}

impl Workload {
    /// Creates a workload from a list of accesses.
    pub fn new(ops: Vec<WorkloadOp>) -> Self {
        Self { ops }
    }

    /// Loads a workload from a YAML string.
    pub fn from_yaml(yaml: &str) -> ConfigResult<Self> {
        let workload: Workload = serde_yaml::from_str(yaml)?;
        workload.validate()?;
        Ok(workload)
    }

    /// Loads a workload from a JSON string.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let workload: Workload = serde_json::from_str(json)?;
        workload.validate()?;
        Ok(workload)
    }

    /// Loads a workload from a file, auto-detecting format.
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(&std::fs::read_to_string(path)?),
            "json" => Self::from_json(&std::fs::read_to_string(path)?),
            _ => Err(ConfigError::UnknownFormat(ext.to_string())),
        }
    }

    /// Checks that every store has a supported size.
    pub fn validate(&self) -> ConfigResult<()> {
        for (i, op) in self.ops.iter().enumerate() {
            if let WorkloadOp::Store { size, .. } = op {
                if !matches!(size, 1 | 2 | 4) {
                    return Err(ConfigError::Validation(format!(
                        "Workload entry {} stores {} bytes; only 1, 2 or 4 are supported",
                        i, size
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of accesses.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if there are no accesses.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over the accesses.
    pub fn iter(&self) -> impl Iterator<Item = &WorkloadOp> {
        self.ops.iter()
    }

    /// Consumes the workload, returning its accesses.
    pub fn into_ops(self) -> Vec<WorkloadOp> {
        self.ops
    }
}
