//! Job queue configuration.

use serde::{Deserialize, Serialize};

/// Concurrency ceiling and memory backpressure settings for the job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on concurrently running jobs.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    /// Free memory (MiB) that must remain available before a new job is dispatched.
    #[serde(default = "default_memory_reserve")]
    pub memory_reserve_mb: u64,
    /// Estimated memory (MiB) one running job consumes.
    #[serde(default = "default_memory_per_job")]
    pub memory_per_job_mb: u64,
    /// Seconds shutdown waits for in-flight jobs to return.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            memory_reserve_mb: default_memory_reserve(),
            memory_per_job_mb: default_memory_per_job(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_max_concurrent_jobs() -> usize {
    2
}

fn default_memory_reserve() -> u64 {
    512
}

fn default_memory_per_job() -> u64 {
    256
}

fn default_shutdown_grace() -> u64 {
    30
}
