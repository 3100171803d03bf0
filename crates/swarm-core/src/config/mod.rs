//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section, and every section has serde defaults so an empty file is a
//! valid configuration.

pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod realtime;
pub mod routing;
pub mod scheduler;
pub mod storage;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::pipeline::PipelineConfig;
use self::queue::QueueConfig;
use self::realtime::RealtimeConfig;
use self::routing::JobRoutingConfig;
use self::scheduler::SchedulerConfig;
use self::storage::StorageConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Job queue concurrency and backpressure settings.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Per-job-type orchestrator routing.
    #[serde(default)]
    pub job_routing: JobRoutingConfig,
    /// Recurring task scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Job and task persistence settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Lifecycle event bus settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Pipeline strategy and agent process settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `SWARM__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("SWARM")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Parse configuration from an in-memory TOML document.
    pub fn from_toml_str(toml: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
