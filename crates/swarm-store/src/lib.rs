//! Job and scheduled-task persistence for the swarm job engine.
//!
//! Two [`JobStore`](swarm_core::traits::JobStore) implementations:
//! - [`MemoryStore`] for tests and ephemeral deployments
//! - [`FileStore`] keeping one JSON document per record on disk

pub mod file;
pub mod memory;

use std::sync::Arc;

use swarm_core::config::storage::{StorageBackend, StorageConfig};
use swarm_core::result::AppResult;
use swarm_core::traits::JobStore;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Build the store selected by configuration.
pub async fn create_store(config: &StorageConfig) -> AppResult<Arc<dyn JobStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory job store; state will not survive restarts");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageBackend::File => {
            let store = FileStore::open(&config.data_dir).await?;
            tracing::info!("Using file job store at '{}'", config.data_dir);
            Ok(Arc::new(store))
        }
    }
}
