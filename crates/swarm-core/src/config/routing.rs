//! Orchestrator routing configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of an execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorKind {
    /// Fixed, mode-dependent stage sequence.
    Deterministic,
    /// Adaptive plan/execute/review rounds.
    Agentic,
}

impl OrchestratorKind {
    /// Return the strategy identifier as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deterministic => "deterministic",
            Self::Agentic => "agentic",
        }
    }
}

impl fmt::Display for OrchestratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrchestratorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" => Ok(Self::Deterministic),
            "agentic" => Ok(Self::Agentic),
            other => Err(format!("unknown orchestrator '{other}'")),
        }
    }
}

/// Which strategy each job type is routed to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRoutingConfig {
    /// Strategy for user-submitted interactive jobs.
    #[serde(default = "default_interactive")]
    pub interactive: OrchestratorKind,
    /// Strategies for scheduler-submitted jobs, per sub-type.
    #[serde(default)]
    pub scheduled: ScheduledRoutingConfig,
}

/// Strategies for the scheduled job sub-types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRoutingConfig {
    /// `scheduled-generic` jobs.
    #[serde(default = "default_scheduled")]
    pub generic: OrchestratorKind,
    /// `scheduled-ci` jobs.
    #[serde(default = "default_scheduled")]
    pub ci: OrchestratorKind,
    /// `scheduled-report` jobs.
    #[serde(default = "default_scheduled")]
    pub report: OrchestratorKind,
    /// `scheduled-deploy` jobs.
    #[serde(default = "default_scheduled")]
    pub deploy: OrchestratorKind,
}

impl Default for JobRoutingConfig {
    fn default() -> Self {
        Self {
            interactive: default_interactive(),
            scheduled: ScheduledRoutingConfig::default(),
        }
    }
}

impl Default for ScheduledRoutingConfig {
    fn default() -> Self {
        Self {
            generic: default_scheduled(),
            ci: default_scheduled(),
            report: default_scheduled(),
            deploy: default_scheduled(),
        }
    }
}

fn default_interactive() -> OrchestratorKind {
    OrchestratorKind::Agentic
}

fn default_scheduled() -> OrchestratorKind {
    OrchestratorKind::Deterministic
}
