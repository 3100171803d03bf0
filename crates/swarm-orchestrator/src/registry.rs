//! Process-lifetime strategy instances.

use std::sync::Arc;

use swarm_core::config::pipeline::PipelineConfig;
use swarm_core::config::routing::OrchestratorKind;

use crate::agent::AgentRunner;
use crate::contract::Orchestrator;
use crate::strategies::{AgenticOrchestrator, DeterministicOrchestrator, StrategySettings};

/// Holds exactly one instance of each strategy.
///
/// Built once at bootstrap and handed to the job queue; every dispatch of a
/// given kind reuses the same instance.
#[derive(Debug, Clone)]
pub struct OrchestratorRegistry {
    deterministic: Arc<dyn Orchestrator>,
    agentic: Arc<dyn Orchestrator>,
}

impl OrchestratorRegistry {
    /// Create a registry from explicit instances.
    pub fn new(deterministic: Arc<dyn Orchestrator>, agentic: Arc<dyn Orchestrator>) -> Self {
        Self {
            deterministic,
            agentic,
        }
    }

    /// Create the built-in strategies over a shared agent runner.
    pub fn with_agent_runner(runner: Arc<dyn AgentRunner>, config: &PipelineConfig) -> Self {
        let settings = StrategySettings::from(config);
        Self::new(
            Arc::new(DeterministicOrchestrator::new(Arc::clone(&runner), settings)),
            Arc::new(AgenticOrchestrator::new(runner, settings)),
        )
    }

    /// The instance for a strategy kind.
    pub fn get(&self, kind: OrchestratorKind) -> Arc<dyn Orchestrator> {
        match kind {
            OrchestratorKind::Deterministic => Arc::clone(&self.deterministic),
            OrchestratorKind::Agentic => Arc::clone(&self.agentic),
        }
    }
}
