//! Adaptive plan → execute → review rounds.

use std::sync::Arc;

use async_trait::async_trait;

use swarm_core::config::routing::OrchestratorKind;
use swarm_core::types::{JobMode, PipelineResult};

use super::{StrategySettings, Transcript, step_progress};
use crate::agent::{AgentOutput, AgentRequest, AgentRunner};
use crate::contract::{Orchestrator, PipelineError, RunOptions};

const STEPS_PER_ROUND: usize = 3;

/// Lets the agents steer: a planner decides the approach, an executor
/// carries it out and a reviewer grades it. A rejected answer starts
/// another round with the reviewer's feedback, up to `max_rounds`.
#[derive(Debug, Clone)]
pub struct AgenticOrchestrator {
    runner: Arc<dyn AgentRunner>,
    settings: StrategySettings,
}

impl AgenticOrchestrator {
    /// Create the strategy over an agent runner.
    pub fn new(runner: Arc<dyn AgentRunner>, settings: StrategySettings) -> Self {
        Self { runner, settings }
    }

    async fn step(
        &self,
        options: &RunOptions,
        transcript: &mut Transcript,
        role: &str,
        prompt: String,
        progress: u8,
    ) -> Result<AgentOutput, PipelineError> {
        options.checkpoint()?;
        options.progress.stage(role, progress);

        let output = self
            .runner
            .run_agent(AgentRequest {
                role: role.to_string(),
                prompt,
                session_id: options.session_id.clone(),
                attachments: options.attachments.clone(),
            })
            .await?;
        transcript.record(role, &output);
        Ok(output)
    }
}

fn mode_hint(mode: JobMode) -> &'static str {
    match mode {
        JobMode::Chat => "Answer conversationally.",
        JobMode::Research => "Cite sources for every claim.",
        JobMode::Code => "Produce working code.",
        JobMode::Swarm => "Split the work across specialist agents.",
    }
}

#[async_trait]
impl Orchestrator for AgenticOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Agentic
    }

    async fn run(&self, options: RunOptions) -> Result<PipelineResult, PipelineError> {
        let max_rounds = self.settings.max_rounds.max(1) as usize;
        let total_steps = max_rounds * STEPS_PER_ROUND;
        let mut transcript = Transcript::default();
        let mut feedback: Option<String> = None;
        let mut best: Option<(AgentOutput, f64)> = None;

        for round in 0..max_rounds {
            let base = round * STEPS_PER_ROUND;

            let mut plan_prompt = format!(
                "Task:\n{}\n\n{}\nDescribe the plan.",
                options.prompt,
                mode_hint(options.mode)
            );
            if let Some(feedback) = &feedback {
                plan_prompt.push_str(&format!("\n\nReviewer feedback on the last attempt:\n{feedback}"));
            }
            let plan = self
                .step(
                    &options,
                    &mut transcript,
                    "plan",
                    plan_prompt,
                    step_progress(base, total_steps),
                )
                .await?;

            let answer = self
                .step(
                    &options,
                    &mut transcript,
                    "execute",
                    format!("Task:\n{}\n\nPlan:\n{}", options.prompt, plan.text),
                    step_progress(base + 1, total_steps),
                )
                .await?;

            let review = self
                .step(
                    &options,
                    &mut transcript,
                    "review",
                    format!(
                        "Task:\n{}\n\nCandidate answer to validate:\n{}",
                        options.prompt, answer.text
                    ),
                    step_progress(base + 2, total_steps),
                )
                .await?;

            let accepted = review.confidence >= self.settings.validation_threshold;
            tracing::debug!(
                "Job {} round {}/{}: review confidence {:.2} ({})",
                options.job_id,
                round + 1,
                max_rounds,
                review.confidence,
                if accepted { "accepted" } else { "rejected" }
            );

            if best.as_ref().is_none_or(|(_, c)| review.confidence > *c) {
                best = Some((answer, review.confidence));
            }
            if accepted {
                break;
            }
            feedback = Some(review.text);
        }

        let (answer, confidence) = best.ok_or_else(|| PipelineError::Agent {
            role: "pipeline".to_string(),
            message: "no round completed".to_string(),
        })?;
        let (agents, sources) = transcript.into_parts();

        Ok(PipelineResult {
            final_output: answer.text,
            confidence,
            agents,
            sources,
            validation_passed: confidence >= self.settings.validation_threshold,
        })
    }
}
