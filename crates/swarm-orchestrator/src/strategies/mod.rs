//! Built-in execution strategies.

pub mod agentic;
pub mod deterministic;

use swarm_core::config::pipeline::PipelineConfig;
use swarm_core::types::AgentSummary;

use crate::agent::AgentOutput;

pub use agentic::AgenticOrchestrator;
pub use deterministic::DeterministicOrchestrator;

/// Longest agent output kept in an [`AgentSummary`].
const SUMMARY_CHARS: usize = 280;

/// Knobs shared by both strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrategySettings {
    /// Minimum review confidence for `validation_passed`.
    pub validation_threshold: f64,
    /// Upper bound on agentic plan/execute/review rounds.
    pub max_rounds: u32,
}

impl From<&PipelineConfig> for StrategySettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            validation_threshold: config.validation_threshold,
            max_rounds: config.max_agentic_rounds.max(1),
        }
    }
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Accumulates per-agent summaries and deduplicated sources for a run.
#[derive(Debug, Default)]
pub(crate) struct Transcript {
    agents: Vec<AgentSummary>,
    sources: Vec<String>,
}

impl Transcript {
    pub(crate) fn record(&mut self, role: &str, output: &AgentOutput) {
        self.agents.push(AgentSummary {
            role: role.to_string(),
            summary: summarize(&output.text),
            confidence: output.confidence,
        });
        for source in &output.sources {
            if !self.sources.contains(source) {
                self.sources.push(source.clone());
            }
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<AgentSummary>, Vec<String>) {
        (self.agents, self.sources)
    }
}

fn summarize(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SUMMARY_CHARS {
        return text.to_string();
    }
    let mut summary: String = text.chars().take(SUMMARY_CHARS).collect();
    summary.push('…');
    summary
}

/// Progress for entering step `index` of `total`, leaving room for completion.
pub(crate) fn step_progress(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((index * 95) / total).min(95) as u8
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::agent::{AgentOutput, AgentRequest, AgentRunner};
    use crate::contract::PipelineError;

    /// Replays scripted outputs and records every request.
    #[derive(Debug, Default)]
    pub(crate) struct ScriptedRunner {
        pub(crate) replies: Mutex<VecDeque<Result<AgentOutput, String>>>,
        pub(crate) requests: Mutex<Vec<AgentRequest>>,
    }

    impl ScriptedRunner {
        pub(crate) fn with_replies(replies: Vec<Result<AgentOutput, String>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn roles(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.role.clone())
                .collect()
        }
    }

    pub(crate) fn reply(text: &str, confidence: f64) -> Result<AgentOutput, String> {
        Ok(AgentOutput {
            text: text.to_string(),
            confidence,
            sources: Vec::new(),
        })
    }

    #[async_trait]
    impl AgentRunner for ScriptedRunner {
        async fn run_agent(&self, request: AgentRequest) -> Result<AgentOutput, PipelineError> {
            let role = request.role.clone();
            self.requests.lock().unwrap().push(request);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(Ok(output)) => Ok(output),
                Some(Err(message)) => Err(PipelineError::Agent { role, message }),
                None => Ok(AgentOutput {
                    text: format!("{role} output"),
                    confidence: 0.9,
                    sources: Vec::new(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_dedups_sources() {
        let mut transcript = Transcript::default();
        let output = AgentOutput {
            text: "a".into(),
            confidence: 0.5,
            sources: vec!["x".into(), "y".into()],
        };
        transcript.record("research", &output);
        transcript.record("review", &output);

        let (agents, sources) = transcript.into_parts();
        assert_eq!(agents.len(), 2);
        assert_eq!(sources, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn test_long_output_is_truncated() {
        let long = "z".repeat(1000);
        let summary = summarize(&long);
        assert_eq!(summary.chars().count(), SUMMARY_CHARS + 1);
    }

    #[test]
    fn test_step_progress_bounds() {
        assert_eq!(step_progress(0, 4), 0);
        assert_eq!(step_progress(2, 4), 47);
        assert_eq!(step_progress(4, 4), 95);
        assert_eq!(step_progress(3, 0), 0);
    }
}
