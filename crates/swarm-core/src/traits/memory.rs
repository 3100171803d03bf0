//! Live memory statistics trait.

use crate::types::MemoryStats;

/// Reports current free and total system memory.
pub trait MemoryStatsProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Take a fresh snapshot.
    fn memory_stats(&self) -> MemoryStats;
}
