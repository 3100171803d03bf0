//! Orchestrator contract and routing for the swarm job engine.
//!
//! This crate provides:
//! - The [`Orchestrator`] contract every execution strategy implements
//! - [`resolve_orchestrator_for_job`], the pure routing function
//! - [`OrchestratorRegistry`], holding the process-lifetime strategy instances
//! - The deterministic and agentic strategies, built over an [`AgentRunner`]

pub mod agent;
pub mod contract;
pub mod registry;
pub mod resolver;
pub mod strategies;

pub use agent::{AgentOutput, AgentRequest, AgentRunner, CommandAgentRunner};
pub use contract::{Orchestrator, PipelineError, ProgressReporter, RunOptions};
pub use registry::OrchestratorRegistry;
pub use resolver::{RoutingDecision, RoutingRequest, resolve_orchestrator_for_job};
pub use strategies::{AgenticOrchestrator, DeterministicOrchestrator, StrategySettings};
