//! Job entity, lifecycle status, and typed updates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::result::AppResult;

/// Longest accepted caller-supplied job id.
pub const MAX_JOB_ID_LEN: usize = 128;

/// Status of a job.
///
/// `queued → running → {completed, failed, cancelled}` and
/// `queued → cancelled`. Terminal states have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting for a concurrency slot.
    Queued,
    /// Handed to an orchestrator.
    Running,
    /// The orchestrator returned a result.
    Completed,
    /// The orchestrator returned an error.
    Failed,
    /// Cancelled by a caller.
    Cancelled,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the job holds its idempotency reservation in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Check whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Running)
                | (Self::Queued, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
                | (Self::Running, Self::Cancelled)
        )
    }

    /// Return the status as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who submitted a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    /// A user request (HTTP/WebSocket handler).
    #[default]
    User,
    /// A scheduled task firing.
    Scheduler,
}

impl JobSource {
    /// Job type assumed when a submission carries none.
    pub fn default_job_type(&self) -> JobType {
        match self {
            Self::User => JobType::Interactive,
            Self::Scheduler => JobType::ScheduledGeneric,
        }
    }
}

/// Routing category of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// A user waiting on the result.
    Interactive,
    /// Scheduled work with no more specific category.
    ScheduledGeneric,
    /// Scheduled CI run.
    ScheduledCi,
    /// Scheduled report generation.
    ScheduledReport,
    /// Scheduled deployment.
    ScheduledDeploy,
}

impl JobType {
    /// Return the job type as its kebab-case identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::ScheduledGeneric => "scheduled-generic",
            Self::ScheduledCi => "scheduled-ci",
            Self::ScheduledReport => "scheduled-report",
            Self::ScheduledDeploy => "scheduled-deploy",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution mode requested by the submitter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobMode {
    /// Single conversational answer.
    #[default]
    Chat,
    /// Research and synthesis with citations.
    Research,
    /// Code generation with validation.
    Code,
    /// Full multi-agent swarm.
    Swarm,
}

impl JobMode {
    /// Return the mode as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Research => "research",
            Self::Code => "code",
            Self::Swarm => "swarm",
        }
    }
}

/// A file handed to the pipeline alongside the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Original file name.
    pub name: String,
    /// MIME type, if known.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Location the pipeline can read the content from.
    pub path: String,
}

/// One unit of submitted swarm-pipeline work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: String,
    /// Owning client session.
    pub session_id: String,
    /// Task description handed to the pipeline.
    pub prompt: String,
    /// Execution mode.
    pub mode: JobMode,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Who submitted the job.
    pub source: JobSource,
    /// Routing category; `None` means "derive from source".
    #[serde(default)]
    pub job_type: Option<JobType>,
    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,
    /// Caller token deduplicating resubmissions within the session.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// When the job was submitted.
    pub created_at: DateTime<Utc>,
    /// When the job was dispatched.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Percent complete, 0-100.
    #[serde(default)]
    pub progress: u8,
    /// Name of the pipeline stage currently executing.
    #[serde(default)]
    pub current_stage: Option<String>,
    /// Failure message.
    #[serde(default)]
    pub error: Option<String>,
    /// Files handed to the pipeline.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl Job {
    /// The routing category, falling back to the source's default.
    pub fn effective_job_type(&self) -> JobType {
        self.job_type
            .unwrap_or_else(|| self.source.default_job_type())
    }

    /// The `(session, trimmed key)` pair this job reserves, if any.
    pub fn idempotency_slot(&self) -> Option<(String, String)> {
        normalize_idempotency_key(self.idempotency_key.as_deref())
            .map(|key| (self.session_id.clone(), key))
    }

    /// Apply a typed update. Returns `true` when the job changed.
    ///
    /// Terminal jobs are frozen; every update is ignored.
    pub fn apply(&mut self, update: &JobUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match update {
            JobUpdate::Progress(value) => {
                let value = (*value).min(100);
                if value <= self.progress {
                    return false;
                }
                self.progress = value;
                true
            }
            JobUpdate::Stage(stage) => {
                if self.current_stage.as_deref() == Some(stage.as_str()) {
                    return false;
                }
                self.current_stage = Some(stage.clone());
                true
            }
            JobUpdate::Error(message) => {
                self.error = Some(message.clone());
                true
            }
        }
    }
}

/// The closed set of caller-visible job mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JobUpdate {
    /// Raise progress (clamped to 100; never lowered).
    Progress(u8),
    /// Record the pipeline stage now executing.
    Stage(String),
    /// Attach an error message without changing status.
    Error(String),
}

/// Parameters for submitting a job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueParams {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Owning client session.
    pub session_id: String,
    /// Task description.
    pub prompt: String,
    /// Execution mode.
    #[serde(default)]
    pub mode: JobMode,
    /// Submitter; defaults to `user`.
    #[serde(default)]
    pub source: Option<JobSource>,
    /// Routing category override.
    #[serde(default)]
    pub job_type: Option<JobType>,
    /// Dispatch priority; defaults to 0.
    #[serde(default)]
    pub priority: Option<i32>,
    /// Deduplication token.
    #[serde(default)]
    pub idempotency_key: Option<String>,
    /// Files handed to the pipeline.
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl EnqueueParams {
    /// Create submission parameters with defaults for every optional field.
    pub fn new(session_id: impl Into<String>, prompt: impl Into<String>, mode: JobMode) -> Self {
        Self {
            session_id: session_id.into(),
            prompt: prompt.into(),
            mode,
            ..Default::default()
        }
    }

    /// Reject submissions that must never create a job.
    pub fn validate(&self) -> AppResult<()> {
        if self.session_id.trim().is_empty() {
            return Err(AppError::validation("session_id must not be empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(AppError::validation("prompt must not be empty"));
        }
        if let Some(id) = &self.id {
            validate_job_id(id)?;
        }
        Ok(())
    }

    /// Build the queued job these parameters describe.
    pub fn into_job(self) -> Job {
        let source = self.source.unwrap_or_default();
        Job {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            session_id: self.session_id,
            prompt: self.prompt,
            mode: self.mode,
            status: JobStatus::Queued,
            source,
            job_type: self.job_type,
            priority: self.priority.unwrap_or(0),
            idempotency_key: self.idempotency_key,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            progress: 0,
            current_stage: None,
            error: None,
            attachments: self.attachments,
        }
    }
}

/// Trim a key; blank keys do not deduplicate.
pub fn normalize_idempotency_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// Check a caller-supplied id is non-empty, bounded, and path-safe.
pub fn validate_job_id(id: &str) -> AppResult<()> {
    if id.is_empty() || id.len() > MAX_JOB_ID_LEN {
        return Err(AppError::validation(format!(
            "job id must be 1-{MAX_JOB_ID_LEN} characters"
        )));
    }
    if id == "." || id == ".." {
        return Err(AppError::validation("job id must not be a path component"));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::validation(format!(
            "job id '{id}' contains unsupported characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> Job {
        EnqueueParams::new("s1", "build it", JobMode::Code).into_job()
    }

    #[test]
    fn test_state_machine_edges() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Cancelled));
        assert!(Running.can_transition_to(Failed));
        assert!(!Queued.can_transition_to(Completed));
        for terminal in [Completed, Failed, Cancelled] {
            for next in [Queued, Running, Completed, Failed, Cancelled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_into_job_defaults() {
        let job = queued_job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.source, JobSource::User);
        assert_eq!(job.priority, 0);
        assert_eq!(job.progress, 0);
        assert_eq!(job.effective_job_type(), JobType::Interactive);
        assert!(Uuid::parse_str(&job.id).is_ok());
    }

    #[test]
    fn test_scheduler_source_defaults_to_generic() {
        let mut params = EnqueueParams::new("s1", "nightly", JobMode::Chat);
        params.source = Some(JobSource::Scheduler);
        assert_eq!(
            params.into_job().effective_job_type(),
            JobType::ScheduledGeneric
        );
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = queued_job();
        assert!(job.apply(&JobUpdate::Progress(40)));
        assert!(!job.apply(&JobUpdate::Progress(10)));
        assert_eq!(job.progress, 40);
        assert!(job.apply(&JobUpdate::Progress(250)));
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_terminal_job_ignores_updates() {
        let mut job = queued_job();
        job.status = JobStatus::Cancelled;
        assert!(!job.apply(&JobUpdate::Progress(50)));
        assert!(!job.apply(&JobUpdate::Stage("review".into())));
        assert!(!job.apply(&JobUpdate::Error("late failure".into())));
        assert_eq!(job.progress, 0);
        assert!(job.current_stage.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_idempotency_key_is_trimmed() {
        let mut job = queued_job();
        job.idempotency_key = Some("  retry-1 ".to_string());
        assert_eq!(
            job.idempotency_slot(),
            Some(("s1".to_string(), "retry-1".to_string()))
        );

        job.idempotency_key = Some("   ".to_string());
        assert_eq!(job.idempotency_slot(), None);
    }

    #[test]
    fn test_validation() {
        assert!(EnqueueParams::new("", "x", JobMode::Chat).validate().is_err());
        assert!(EnqueueParams::new("s", "  ", JobMode::Chat).validate().is_err());

        let mut params = EnqueueParams::new("s", "x", JobMode::Chat);
        params.id = Some("../etc/passwd".to_string());
        assert!(params.validate().is_err());

        params.id = Some("job-42_a.b".to_string());
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(JobType::ScheduledCi).unwrap();
        assert_eq!(json, "scheduled-ci");
        let update: JobUpdate =
            serde_json::from_value(serde_json::json!({"kind": "progress", "value": 30})).unwrap();
        assert_eq!(update, JobUpdate::Progress(30));
    }
}
