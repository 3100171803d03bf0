//! Pipeline strategy configuration.

use serde::{Deserialize, Serialize};

/// Settings shared by the built-in orchestrator strategies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Executable invoked for every agent stage.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Arguments passed before the stage role.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Per-stage timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_seconds: u64,
    /// Minimum reviewer confidence for `validation_passed`.
    #[serde(default = "default_validation_threshold")]
    pub validation_threshold: f64,
    /// Upper bound on plan/execute/review rounds for the agentic strategy.
    #[serde(default = "default_max_rounds")]
    pub max_agentic_rounds: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_command: default_agent_command(),
            agent_args: Vec::new(),
            agent_timeout_seconds: default_agent_timeout(),
            validation_threshold: default_validation_threshold(),
            max_agentic_rounds: default_max_rounds(),
        }
    }
}

fn default_agent_command() -> String {
    "claude".to_string()
}

fn default_agent_timeout() -> u64 {
    600
}

fn default_validation_threshold() -> f64 {
    0.7
}

fn default_max_rounds() -> u32 {
    3
}
