//! In-memory store using dashmap.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use swarm_core::result::AppResult;
use swarm_core::traits::JobStore;
use swarm_core::types::{Job, ScheduledTask};

/// In-memory job store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    jobs: Arc<DashMap<String, Job>>,
    tasks: Arc<DashMap<String, ScheduledTask>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch one stored job.
    pub fn job(&self, id: &str) -> Option<Job> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    /// Fetch one stored task.
    pub fn task(&self, id: &str) -> Option<ScheduledTask> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn get_jobs(&self) -> AppResult<Vec<Job>> {
        Ok(self.jobs.iter().map(|e| e.value().clone()).collect())
    }

    async fn save_job(&self, job: &Job) -> AppResult<()> {
        self.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_scheduled_tasks(&self) -> AppResult<Vec<ScheduledTask>> {
        Ok(self.tasks.iter().map(|e| e.value().clone()).collect())
    }

    async fn save_scheduled_task(&self, task: &ScheduledTask) -> AppResult<()> {
        self.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn delete_scheduled_task(&self, id: &str) -> AppResult<()> {
        self.tasks.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::types::{EnqueueParams, JobMode, JobStatus};

    #[tokio::test]
    async fn test_save_replaces_by_id() {
        let store = MemoryStore::new();
        let mut job = EnqueueParams::new("s1", "p", JobMode::Chat).into_job();
        store.save_job(&job).await.unwrap();

        job.status = JobStatus::Running;
        store.save_job(&job).await.unwrap();

        let jobs = store.get_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Running);
        assert_eq!(store.job(&job.id).unwrap().status, JobStatus::Running);
    }

    #[tokio::test]
    async fn test_delete_unknown_task_is_ok() {
        let store = MemoryStore::new();
        store.delete_scheduled_task("missing").await.unwrap();
        assert!(store.get_scheduled_tasks().await.unwrap().is_empty());
    }
}
