//! The contract between the job queue and an execution strategy.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use swarm_core::config::routing::OrchestratorKind;
use swarm_core::types::{Attachment, JobMode, JobUpdate, PipelineResult};

/// Error from a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The run observed its cancellation token and stopped.
    #[error("Pipeline cancelled")]
    Cancelled,

    /// An agent stage failed.
    #[error("Agent '{role}' failed: {message}")]
    Agent {
        /// Role of the failing stage.
        role: String,
        /// What went wrong.
        message: String,
    },

    /// An agent stage exceeded its time limit.
    #[error("Agent '{role}' timed out after {seconds}s")]
    Timeout {
        /// Role of the stage.
        role: String,
        /// Limit that was exceeded.
        seconds: u64,
    },
}

/// Callback a strategy uses to report stage and progress changes.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(JobUpdate) + Send + Sync>,
}

impl ProgressReporter {
    /// Wrap a callback.
    pub fn new(sink: impl Fn(JobUpdate) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A reporter that discards every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Report one update.
    pub fn report(&self, update: JobUpdate) {
        (self.sink)(update);
    }

    /// Report entering a stage at the given progress.
    pub fn stage(&self, stage: &str, progress: u8) {
        self.report(JobUpdate::Stage(stage.to_string()));
        self.report(JobUpdate::Progress(progress));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter").finish()
    }
}

/// Everything a strategy needs to run one job.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The job being executed.
    pub job_id: String,
    /// Owning session.
    pub session_id: String,
    /// Task description.
    pub prompt: String,
    /// Execution mode.
    pub mode: JobMode,
    /// Files handed to the pipeline.
    pub attachments: Vec<Attachment>,
    /// Triggered when the job is cancelled; strategies check it between stages.
    pub cancel: CancellationToken,
    /// Stage and progress sink.
    pub progress: ProgressReporter,
}

impl RunOptions {
    /// Return `Err(Cancelled)` once cancellation has been requested.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            tracing::info!("Job {} observed cancellation", self.job_id);
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

/// An interchangeable execution strategy.
///
/// The queue treats `Ok` as success and any `Err` as failure, whichever
/// strategy ran; it never inspects pipeline internals.
#[async_trait]
pub trait Orchestrator: Send + Sync + fmt::Debug + 'static {
    /// Which strategy this is.
    fn kind(&self) -> OrchestratorKind;

    /// Execute the pipeline for one job.
    async fn run(&self, options: RunOptions) -> Result<PipelineResult, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_reporter_forwards_updates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(move |u| sink.lock().unwrap().push(u));

        reporter.stage("research", 25);

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                JobUpdate::Stage("research".to_string()),
                JobUpdate::Progress(25)
            ]
        );
    }

    #[test]
    fn test_checkpoint_after_cancel() {
        let options = RunOptions {
            job_id: "j1".into(),
            session_id: "s1".into(),
            prompt: "p".into(),
            mode: JobMode::Chat,
            attachments: Vec::new(),
            cancel: CancellationToken::new(),
            progress: ProgressReporter::noop(),
        };
        assert!(options.checkpoint().is_ok());
        options.cancel.cancel();
        assert!(matches!(options.checkpoint(), Err(PipelineError::Cancelled)));
    }

    #[test]
    fn test_error_messages() {
        let err = PipelineError::Timeout {
            role: "review".into(),
            seconds: 30,
        };
        assert_eq!(err.to_string(), "Agent 'review' timed out after 30s");
    }
}
