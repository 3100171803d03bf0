//! Memory statistics and the memory-derived concurrency limit.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use sysinfo::System;

use swarm_core::config::queue::QueueConfig;
use swarm_core::traits::MemoryStatsProvider;
use swarm_core::types::MemoryStats;

/// Live system memory via `sysinfo`.
#[derive(Debug)]
pub struct SystemMemoryProvider {
    system: Mutex<System>,
}

impl SystemMemoryProvider {
    /// Create a provider; memory is refreshed on every query.
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SystemMemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStatsProvider for SystemMemoryProvider {
    fn memory_stats(&self) -> MemoryStats {
        let mut system = match self.system.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        system.refresh_memory();

        let total = system.total_memory();
        // Some platforms report 0 available; fall back to total minus used.
        let available = match system.available_memory() {
            0 => total.saturating_sub(system.used_memory()),
            available => available,
        };
        MemoryStats::from_bytes(available, total)
    }
}

/// Reports a fixed, adjustable amount of memory.
///
/// Used when dispatch should not depend on the host, and in tests that
/// simulate memory pressure.
#[derive(Debug)]
pub struct FixedMemoryProvider {
    free_bytes: AtomicU64,
    total_bytes: AtomicU64,
}

impl FixedMemoryProvider {
    /// Report `free_mb` free out of `total_mb`.
    pub fn new(free_mb: u64, total_mb: u64) -> Self {
        Self {
            free_bytes: AtomicU64::new(free_mb * 1024 * 1024),
            total_bytes: AtomicU64::new(total_mb * 1024 * 1024),
        }
    }

    /// Plenty of memory; dispatch is bounded only by configuration.
    pub fn unlimited() -> Self {
        Self::new(u64::MAX / (2 * 1024 * 1024), u64::MAX / (2 * 1024 * 1024))
    }

    /// Change the reported free memory.
    pub fn set_free_mb(&self, free_mb: u64) {
        self.free_bytes
            .store(free_mb * 1024 * 1024, Ordering::SeqCst);
    }
}

impl MemoryStatsProvider for FixedMemoryProvider {
    fn memory_stats(&self) -> MemoryStats {
        MemoryStats::from_bytes(
            self.free_bytes.load(Ordering::SeqCst),
            self.total_bytes.load(Ordering::SeqCst),
        )
    }
}

/// How many jobs may be running given current memory.
///
/// At or below the reserve no new job may start, so the limit equals the
/// current active count. Above it, every `memory_per_job_mb` of headroom
/// buys one more slot, with at least one.
pub fn memory_slot_limit(stats: &MemoryStats, active: usize, config: &QueueConfig) -> usize {
    let free_mb = stats.free_mb();
    if free_mb <= config.memory_reserve_mb {
        return active;
    }
    let headroom = free_mb - config.memory_reserve_mb;
    let slots = (headroom / config.memory_per_job_mb.max(1)).max(1);
    active.saturating_add(usize::try_from(slots).unwrap_or(usize::MAX))
}

/// `min(max_concurrent_jobs, memory_slot_limit)`.
///
/// Evaluated only when the dispatcher wakes (enqueue, cancel, a run
/// returning). Memory freed by other processes is not noticed on its own:
/// if nothing is running when dispatch pauses for memory, pending jobs wait
/// for the next submission or cancellation.
pub fn effective_concurrency_limit(
    stats: &MemoryStats,
    active: usize,
    config: &QueueConfig,
) -> usize {
    config
        .max_concurrent_jobs
        .max(1)
        .min(memory_slot_limit(stats, active, config))
}
