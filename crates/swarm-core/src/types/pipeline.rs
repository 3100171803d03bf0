//! Pipeline result returned by every orchestrator strategy.

use serde::{Deserialize, Serialize};

/// What one participating agent contributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    /// Role the agent played (e.g. `"research"`, `"review"`).
    pub role: String,
    /// Short description of the agent's output.
    pub summary: String,
    /// Agent's self-reported confidence, 0.0-1.0.
    pub confidence: f64,
}

/// The outcome of a successful pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    /// Final answer handed back to the client.
    pub final_output: String,
    /// Aggregate confidence, 0.0-1.0.
    pub confidence: f64,
    /// Per-agent contributions in execution order.
    #[serde(default)]
    pub agents: Vec<AgentSummary>,
    /// Citations gathered along the way, deduplicated.
    #[serde(default)]
    pub sources: Vec<String>,
    /// Whether the validation step accepted the output.
    pub validation_passed: bool,
}
