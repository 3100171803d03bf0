//! Lifecycle events emitted by the job queue.
//!
//! Events are handed to a [`Broadcaster`](crate::traits::Broadcaster) and
//! consumed by whatever transport pushes them to clients. The set of
//! variants is closed; transports match on the `type` tag.

pub mod notification;

use serde::{Deserialize, Serialize};

use crate::config::routing::OrchestratorKind;
use crate::types::{Job, PipelineResult};

pub use notification::NotificationLevel;

/// Union of all lifecycle event types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum LifecycleEvent {
    /// Full snapshot of a job after any change.
    JobStatus {
        /// The job as it is now.
        job: Job,
    },
    /// A job entered the pending set.
    JobQueued {
        /// The job id.
        job_id: String,
        /// Owning session.
        session_id: String,
        /// Pending depth after insertion.
        queue_depth: usize,
    },
    /// A job was dispatched to an orchestrator.
    JobStarted {
        /// The job id.
        job_id: String,
        /// Owning session.
        session_id: String,
        /// Strategy chosen for the job.
        orchestrator: OrchestratorKind,
        /// Why that strategy was chosen.
        reason: String,
    },
    /// Running/pending counts changed.
    ActiveJobsCount {
        /// Jobs currently running.
        active: usize,
        /// Jobs waiting in the pending set.
        queued: usize,
    },
    /// A pipeline produced its result.
    PipelineResult {
        /// The job id.
        job_id: String,
        /// Owning session.
        session_id: String,
        /// The result.
        result: PipelineResult,
    },
    /// A pipeline failed.
    PipelineError {
        /// The job id.
        job_id: String,
        /// Owning session.
        session_id: String,
        /// Normalized error message.
        error: String,
    },
    /// Human-readable notice for the user.
    Notification {
        /// Severity.
        level: NotificationLevel,
        /// Short title.
        title: String,
        /// Body text.
        message: String,
        /// Job this notice is about.
        job_id: Option<String>,
    },
}

impl LifecycleEvent {
    /// The `type` tag this event serializes with.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JobStatus { .. } => "job-status",
            Self::JobQueued { .. } => "job-queued",
            Self::JobStarted { .. } => "job-started",
            Self::ActiveJobsCount { .. } => "active-jobs-count",
            Self::PipelineResult { .. } => "pipeline-result",
            Self::PipelineError { .. } => "pipeline-error",
            Self::Notification { .. } => "notification",
        }
    }

    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::JobStatus { job } => Some(&job.id),
            Self::JobQueued { job_id, .. }
            | Self::JobStarted { job_id, .. }
            | Self::PipelineResult { job_id, .. }
            | Self::PipelineError { job_id, .. } => Some(job_id),
            Self::Notification { job_id, .. } => job_id.as_deref(),
            Self::ActiveJobsCount { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_matches_event_type() {
        let events = vec![
            LifecycleEvent::JobQueued {
                job_id: "j1".into(),
                session_id: "s1".into(),
                queue_depth: 1,
            },
            LifecycleEvent::ActiveJobsCount {
                active: 1,
                queued: 0,
            },
            LifecycleEvent::PipelineError {
                job_id: "j1".into(),
                session_id: "s1".into(),
                error: "boom".into(),
            },
            LifecycleEvent::Notification {
                level: NotificationLevel::Success,
                title: "Done".into(),
                message: "ok".into(),
                job_id: None,
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.event_type());
        }
    }

    #[test]
    fn test_job_started_payload() {
        let event = LifecycleEvent::JobStarted {
            job_id: "j1".into(),
            session_id: "s1".into(),
            orchestrator: OrchestratorKind::Agentic,
            reason: "because".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["orchestrator"], "agentic");
        assert_eq!(event.job_id(), Some("j1"));
    }
}
