//! Fixed stage sequence per execution mode.

use std::sync::Arc;

use async_trait::async_trait;

use swarm_core::config::routing::OrchestratorKind;
use swarm_core::types::{JobMode, PipelineResult};

use super::{StrategySettings, Transcript, step_progress};
use crate::agent::{AgentOutput, AgentRequest, AgentRunner};
use crate::contract::{Orchestrator, PipelineError, RunOptions};

/// Role of the stage that validates the output of the stages before it.
const REVIEW: &str = "review";

/// Runs the same stages, in the same order, for every job of a mode.
///
/// Each stage sees the original task plus the previous stage's output.
/// A trailing review stage does not replace the output; it grades it.
#[derive(Debug, Clone)]
pub struct DeterministicOrchestrator {
    runner: Arc<dyn AgentRunner>,
    settings: StrategySettings,
}

impl DeterministicOrchestrator {
    /// Create the strategy over an agent runner.
    pub fn new(runner: Arc<dyn AgentRunner>, settings: StrategySettings) -> Self {
        Self { runner, settings }
    }

    /// The stage roles a mode runs.
    pub fn stages(mode: JobMode) -> &'static [&'static str] {
        match mode {
            JobMode::Chat => &["respond"],
            JobMode::Research => &["research", "synthesize", REVIEW],
            JobMode::Code => &["plan", "implement", REVIEW],
            JobMode::Swarm => &["research", "plan", "implement", REVIEW],
        }
    }
}

fn stage_prompt(role: &str, task: &str, previous: Option<&AgentOutput>) -> String {
    match previous {
        None => format!("Role: {role}\n\nTask:\n{task}"),
        Some(prev) if role == REVIEW => format!(
            "Role: {role}\n\nTask:\n{task}\n\nCandidate answer to validate:\n{}",
            prev.text
        ),
        Some(prev) => format!(
            "Role: {role}\n\nTask:\n{task}\n\nPrevious stage output:\n{}",
            prev.text
        ),
    }
}

#[async_trait]
impl Orchestrator for DeterministicOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Deterministic
    }

    async fn run(&self, options: RunOptions) -> Result<PipelineResult, PipelineError> {
        let stages = Self::stages(options.mode);
        let mut transcript = Transcript::default();
        let mut answer: Option<AgentOutput> = None;
        let mut review: Option<AgentOutput> = None;

        for (index, role) in stages.iter().enumerate() {
            options.checkpoint()?;
            options
                .progress
                .stage(role, step_progress(index, stages.len()));

            let output = self
                .runner
                .run_agent(AgentRequest {
                    role: role.to_string(),
                    prompt: stage_prompt(role, &options.prompt, answer.as_ref()),
                    session_id: options.session_id.clone(),
                    attachments: options.attachments.clone(),
                })
                .await?;
            transcript.record(role, &output);

            if *role == REVIEW {
                review = Some(output);
            } else {
                answer = Some(output);
            }
        }

        let answer = answer.ok_or_else(|| PipelineError::Agent {
            role: "pipeline".to_string(),
            message: format!("mode '{}' produced no answer", options.mode.as_str()),
        })?;
        let confidence = review
            .as_ref()
            .map(|r| r.confidence)
            .unwrap_or(answer.confidence);
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ProgressReporter;
    use crate::strategies::test_support::{ScriptedRunner, reply};
    use std::sync::Mutex;
    use swarm_core::types::JobUpdate;
    use tokio_util::sync::CancellationToken;

    fn options(mode: JobMode) -> RunOptions {
        RunOptions {
            job_id: "j1".into(),
            session_id: "s1".into(),
            prompt: "Write a parser".into(),
            mode,
            attachments: Vec::new(),
            cancel: CancellationToken::new(),
            progress: ProgressReporter::noop(),
        }
    }

    #[tokio::test]
    async fn test_code_mode_runs_fixed_stages() {
        let runner = Arc::new(ScriptedRunner::with_replies(vec![
            reply("the plan", 0.8),
            reply("fn parse() {}", 0.9),
            reply("looks right", 0.75),
        ]));
        let strategy = DeterministicOrchestrator::new(runner.clone(), StrategySettings::default());

        let result = strategy.run(options(JobMode::Code)).await.unwrap();

        assert_eq!(runner.roles(), vec!["plan", "implement", "review"]);
        assert_eq!(result.final_output, "fn parse() {}");
        assert_eq!(result.confidence, 0.75);
        assert!(result.validation_passed);
        assert_eq!(result.agents.len(), 3);

        let requests = runner.requests.lock().unwrap();
        assert!(requests[1].prompt.contains("the plan"));
        assert!(requests[2].prompt.contains("Candidate answer to validate"));
    }

    #[tokio::test]
    async fn test_low_review_confidence_fails_validation() {
        let runner = Arc::new(ScriptedRunner::with_replies(vec![
            reply("notes", 0.9),
            reply("summary", 0.9),
            reply("unsupported claims", 0.2),
        ]));
        let strategy = DeterministicOrchestrator::new(runner, StrategySettings::default());

        let result = strategy.run(options(JobMode::Research)).await.unwrap();

        assert_eq!(result.final_output, "summary");
        assert!(!result.validation_passed);
    }

    #[tokio::test]
    async fn test_chat_is_single_stage() {
        let runner = Arc::new(ScriptedRunner::with_replies(vec![reply("hi", 0.95)]));
        let strategy = DeterministicOrchestrator::new(runner.clone(), StrategySettings::default());

        let result = strategy.run(options(JobMode::Chat)).await.unwrap();

        assert_eq!(runner.roles(), vec!["respond"]);
        assert_eq!(result.final_output, "hi");
        assert!(result.validation_passed);
    }

    #[tokio::test]
    async fn test_stage_failure_propagates() {
        let runner = Arc::new(ScriptedRunner::with_replies(vec![
            reply("plan", 0.9),
            Err("compiler exploded".to_string()),
        ]));
        let strategy = DeterministicOrchestrator::new(runner.clone(), StrategySettings::default());

        let err = strategy.run(options(JobMode::Code)).await.unwrap_err();

        assert_eq!(err.to_string(), "Agent 'implement' failed: compiler exploded");
        assert_eq!(runner.roles().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let runner = Arc::new(ScriptedRunner::default());
        let strategy = DeterministicOrchestrator::new(runner.clone(), StrategySettings::default());
        let opts = options(JobMode::Swarm);
        opts.cancel.cancel();

        let err = strategy.run(opts).await.unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert!(runner.roles().is_empty());
    }

    #[tokio::test]
    async fn test_reports_stage_progress() {
        let updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let mut opts = options(JobMode::Swarm);
        opts.progress = ProgressReporter::new(move |u| sink.lock().unwrap().push(u));

        let strategy = DeterministicOrchestrator::new(
            Arc::new(ScriptedRunner::default()),
            StrategySettings::default(),
        );
        strategy.run(opts).await.unwrap();

        let updates = updates.lock().unwrap();
        let stages: Vec<_> = updates
            .iter()
            .filter_map(|u| match u {
                JobUpdate::Stage(s) => Some(s.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(stages, vec!["research", "plan", "implement", "review"]);
        assert!(updates.contains(&JobUpdate::Progress(71)));
    }
}
