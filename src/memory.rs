//! Sparse byte-addressed memory used as the far end of the loopback link.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::types::SimTime;

/// Access counters for a [`MemoryDevice`].
#[derive(Clone, Debug, Default, Serialize)]
pub struct MemoryStats {
    /// Read requests served
    pub reads: u64,
    /// Posted writes applied
    pub writes: u64,
    /// Bytes loaded from images
    pub image_bytes: u64,
}

/// A sparse memory with a fixed access latency.
///
/// Unwritten bytes read as zero.
#[derive(Clone, Debug, Default)]
pub struct MemoryDevice {
    bytes: HashMap<u64, u8>,
    latency: SimTime,
    stats: MemoryStats,
}

impl MemoryDevice {
    /// Creates an empty memory with the given access latency.
    pub fn new(latency: SimTime) -> Self {
        Self {
            bytes: HashMap::new(),
            latency,
            stats: MemoryStats::default(),
        }
    }

    /// Access latency added between a request's arrival and its completion.
    pub fn latency(&self) -> SimTime {
        self.latency
    }

    /// Reads `len` bytes (at most 4) at `addr`, zero-extended to a word.
    pub fn read(&mut self, addr: u64, len: u8) -> u32 {
        self.stats.reads += 1;
        let value = self.peek(addr, len);
        debug!(addr = format_args!("{addr:#x}"), len, value = format_args!("{value:#010x}"), "memory read");
        value
    }

    /// Reads without counting the access.
    pub fn peek(&self, addr: u64, len: u8) -> u32 {
        let mut word = [0u8; 4];
        for (i, byte) in word.iter_mut().enumerate().take(len.min(4) as usize) {
            *byte = self
                .bytes
                .get(&addr.wrapping_add(i as u64))
                .copied()
                .unwrap_or(0);
        }
        u32::from_le_bytes(word)
    }

    /// Stores `data` starting at `addr`.
    pub fn write(&mut self, addr: u64, data: &[u8]) {
        self.stats.writes += 1;
        self.store(addr, data);
        debug!(addr = format_args!("{addr:#x}"), len = data.len(), "memory write");
    }

    /// Stores a little-endian word without counting the access.
    pub fn poke_word(&mut self, addr: u64, value: u32) {
        self.store(addr, &value.to_le_bytes());
    }

    /// Loads a raw binary image at `base`.
    pub fn load_image<P: AsRef<Path>>(&mut self, path: P, base: u64) -> std::io::Result<usize> {
        let path = path.as_ref();
        let image = std::fs::read(path)?;
        self.store(base, &image);
        self.stats.image_bytes += image.len() as u64;
        info!(
            path = %path.display(),
            base = format_args!("{base:#x}"),
            bytes = image.len(),
            "loaded memory image"
        );
        Ok(image.len())
    }

    /// Number of bytes ever written.
    pub fn populated(&self) -> usize {
        self.bytes.len()
    }

    /// Access counters.
    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    fn store(&mut self, addr: u64, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u64), byte);
        }
    }
}
