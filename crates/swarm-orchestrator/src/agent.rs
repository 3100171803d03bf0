//! Agent invocation seam used by the built-in strategies.
//!
//! A strategy decides *which* agents run and in what order; an
//! [`AgentRunner`] performs one agent invocation. The process-backed
//! [`CommandAgentRunner`] executes a configured CLI with the stage prompt on
//! stdin, with timeout management and output capturing.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use swarm_core::config::pipeline::PipelineConfig;
use swarm_core::types::Attachment;

use crate::contract::PipelineError;

/// One agent invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Stage role (e.g. `"plan"`, `"review"`).
    pub role: String,
    /// Full prompt for this stage.
    pub prompt: String,
    /// Owning session.
    pub session_id: String,
    /// Files handed to the pipeline.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// What an agent produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    /// Agent's answer.
    pub text: String,
    /// Self-reported confidence, 0.0-1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Citations.
    #[serde(default)]
    pub sources: Vec<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl AgentOutput {
    /// Interpret raw agent stdout.
    ///
    /// A JSON object with `text`/`confidence`/`sources` is used as-is; any
    /// other output is treated as plain text with full confidence.
    pub fn from_stdout(stdout: &str) -> Self {
        let trimmed = stdout.trim();
        match serde_json::from_str::<AgentOutput>(trimmed) {
            Ok(mut output) => {
                output.confidence = output.confidence.clamp(0.0, 1.0);
                output
            }
            Err(_) => Self {
                text: trimmed.to_string(),
                confidence: default_confidence(),
                sources: Vec::new(),
            },
        }
    }
}

/// Performs one agent invocation.
#[async_trait]
pub trait AgentRunner: Send + Sync + std::fmt::Debug + 'static {
    /// Run the agent for one stage.
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentOutput, PipelineError>;
}

/// Runs agents as child processes.
///
/// Invoked as `{command} {args...} {role}` with the prompt written to stdin.
#[derive(Debug, Clone)]
pub struct CommandAgentRunner {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandAgentRunner {
    /// Create a runner from pipeline configuration.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            command: config.agent_command.clone(),
            args: config.agent_args.clone(),
            timeout: Duration::from_secs(config.agent_timeout_seconds),
        }
    }
}

#[async_trait]
impl AgentRunner for CommandAgentRunner {
    async fn run_agent(&self, request: AgentRequest) -> Result<AgentOutput, PipelineError> {
        let start = Instant::now();
        tracing::debug!(
            "Spawning agent: command='{}', role='{}', session={}",
            self.command,
            request.role,
            request.session_id
        );

        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(&request.role)
            .env("SWARM_SESSION_ID", &request.session_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for (index, attachment) in request.attachments.iter().enumerate() {
            cmd.env(format!("SWARM_ATTACHMENT_{index}"), &attachment.path);
        }

        let agent_error = |message: String| PipelineError::Agent {
            role: request.role.clone(),
            message,
        };

        let mut child = cmd
            .spawn()
            .map_err(|e| agent_error(format!("failed to spawn '{}': {e}", self.command)))?;

        // The prompt is written while output is drained, both under the
        // stage timeout; dropping stdin afterwards signals EOF.
        let stdin = child.stdin.take();
        let prompt = request.prompt.clone();
        let write_prompt = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(prompt.as_bytes()).await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let exchange = async { tokio::join!(write_prompt, child.wait_with_output()) };

        let output = match tokio::time::timeout(self.timeout, exchange).await {
            Ok((written, Ok(output))) => {
                if let Err(e) = written {
                    tracing::warn!(
                        "Agent '{}' did not read its full prompt: {}",
                        request.role,
                        e
                    );
                }
                output
            }
            Ok((_, Err(e))) => return Err(agent_error(format!("failed to wait for agent: {e}"))),
            Err(_) => {
                tracing::error!(
                    "Agent timed out after {}s: role='{}'",
                    self.timeout.as_secs(),
                    request.role
                );
                return Err(PipelineError::Timeout {
                    role: request.role.clone(),
                    seconds: self.timeout.as_secs(),
                });
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output.status.code().unwrap_or(-1);
            return Err(agent_error(format!(
                "exit code {code}: {}",
                stderr.chars().take(2000).collect::<String>()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            "Agent finished: role='{}', duration={}ms",
            request.role,
            start.elapsed().as_millis()
        );
        Ok(AgentOutput::from_stdout(&stdout))
    }
}
