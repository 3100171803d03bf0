//! System memory snapshot.

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;

/// Free and total system memory at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Memory available to new work, in bytes.
    pub free_bytes: u64,
    /// Installed memory, in bytes.
    pub total_bytes: u64,
    /// Share of total memory in use, 0.0-100.0.
    pub usage_percent: f64,
}

impl MemoryStats {
    /// Build a snapshot, deriving the usage percentage.
    pub fn from_bytes(free_bytes: u64, total_bytes: u64) -> Self {
        let free_bytes = free_bytes.min(total_bytes);
        let usage_percent = if total_bytes == 0 {
            0.0
        } else {
            (total_bytes - free_bytes) as f64 / total_bytes as f64 * 100.0
        };
        Self {
            free_bytes,
            total_bytes,
            usage_percent,
        }
    }

    /// Free memory in whole MiB.
    pub fn free_mb(&self) -> u64 {
        self.free_bytes / MIB
    }

    /// Total memory in whole MiB.
    pub fn total_mb(&self) -> u64 {
        self.total_bytes / MIB
    }
}
