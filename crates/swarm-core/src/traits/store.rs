//! Persistence trait for jobs and scheduled tasks.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{Job, ScheduledTask};

/// Durable storage for jobs and scheduled tasks.
///
/// The engine's in-memory state is authoritative at runtime; a store exists
/// so that state survives a restart. Implementations live in `swarm-store`.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Load every persisted job.
    async fn get_jobs(&self) -> AppResult<Vec<Job>>;

    /// Insert or replace a job.
    async fn save_job(&self, job: &Job) -> AppResult<()>;

    /// Load every persisted scheduled task.
    async fn get_scheduled_tasks(&self) -> AppResult<Vec<ScheduledTask>>;

    /// Insert or replace a scheduled task.
    async fn save_scheduled_task(&self, task: &ScheduledTask) -> AppResult<()>;

    /// Delete a scheduled task. Deleting an unknown id is not an error.
    async fn delete_scheduled_task(&self, id: &str) -> AppResult<()>;
}
