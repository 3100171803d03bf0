//! JSON file store on the local filesystem.
//!
//! Layout: `{root}/jobs/{id}.json` and `{root}/tasks/{id}.json`. Each write
//! goes to a uniquely named temp file that is then renamed over the target,
//! so a crash never leaves a half-written document behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use swarm_core::error::{AppError, ErrorKind};
use swarm_core::result::AppResult;
use swarm_core::traits::JobStore;
use swarm_core::types::job::validate_job_id;
use swarm_core::types::{Job, ScheduledTask};

const JOBS_DIR: &str = "jobs";
const TASKS_DIR: &str = "tasks";

/// File-backed job store.
#[derive(Debug, Clone)]
pub struct FileStore {
    /// Root directory for all documents.
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at the given path.
    pub async fn open(root_path: impl AsRef<Path>) -> AppResult<Self> {
        let root = root_path.as_ref().to_path_buf();
        for dir in [JOBS_DIR, TASKS_DIR] {
            let path = root.join(dir);
            fs::create_dir_all(&path).await.map_err(|e| {
                AppError::with_source(
                    ErrorKind::Storage,
                    format!("Failed to create store directory: {}", path.display()),
                    e,
                )
            })?;
        }
        Ok(Self { root })
    }

    fn document_path(&self, dir: &str, id: &str) -> AppResult<PathBuf> {
        validate_job_id(id)?;
        Ok(self.root.join(dir).join(format!("{id}.json")))
    }

    async fn write_document<T: Serialize>(&self, dir: &str, id: &str, value: &T) -> AppResult<()> {
        let target = self.document_path(dir, id)?;
        let temp = self
            .root
            .join(dir)
            .join(format!(".{id}.{}.tmp", Uuid::new_v4().simple()));
        let data = serde_json::to_vec_pretty(value)?;

        fs::write(&temp, &data).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to write document: {}", temp.display()),
                e,
            )
        })?;
        if let Err(e) = fs::rename(&temp, &target).await {
            let _ = fs::remove_file(&temp).await;
            return Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to replace document: {}", target.display()),
                e,
            ));
        }

        debug!(path = %target.display(), bytes = data.len(), "Wrote document");
        Ok(())
    }

    async fn read_documents<T: DeserializeOwned>(&self, dir: &str) -> AppResult<Vec<T>> {
        let path = self.root.join(dir);
        let mut entries = fs::read_dir(&path).await.map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to list directory: {}", path.display()),
                e,
            )
        })?;

        let mut documents = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let file = entry.path();
            if file.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = match fs::read(&file).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable document '{}': {}", file.display(), e);
                    continue;
                }
            };
            match serde_json::from_slice::<T>(&bytes) {
                Ok(doc) => documents.push(doc),
                Err(e) => warn!("Skipping malformed document '{}': {}", file.display(), e),
            }
        }
        Ok(documents)
    }
}

#[async_trait]
impl JobStore for FileStore {
    async fn get_jobs(&self) -> AppResult<Vec<Job>> {
        self.read_documents(JOBS_DIR).await
    }

    async fn save_job(&self, job: &Job) -> AppResult<()> {
        self.write_document(JOBS_DIR, &job.id, job).await
    }

    async fn get_scheduled_tasks(&self) -> AppResult<Vec<ScheduledTask>> {
        self.read_documents(TASKS_DIR).await
    }

    async fn save_scheduled_task(&self, task: &ScheduledTask) -> AppResult<()> {
        self.write_document(TASKS_DIR, &task.id, task).await
    }

    async fn delete_scheduled_task(&self, id: &str) -> AppResult<()> {
        let path = self.document_path(TASKS_DIR, id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::with_source(
                ErrorKind::Storage,
                format!("Failed to delete document: {}", path.display()),
                e,
            )),
        }
    }
}
