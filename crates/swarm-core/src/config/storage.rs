//! Job and task persistence configuration.

use serde::{Deserialize, Serialize};

/// Which store backs the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON documents on the local filesystem; survives restarts.
    File,
    /// Process memory only.
    Memory,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    /// Root directory for the file backend.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_backend() -> StorageBackend {
    StorageBackend::File
}

fn default_data_dir() -> String {
    "./data".to_string()
}
