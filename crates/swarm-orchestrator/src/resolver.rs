//! Pure routing from a job's origin to an execution strategy.

use serde::{Deserialize, Serialize};

use swarm_core::config::routing::{JobRoutingConfig, OrchestratorKind};
use swarm_core::types::{JobSource, JobType};

/// Input to [`resolve_orchestrator_for_job`].
#[derive(Debug, Clone, Copy)]
pub struct RoutingRequest<'a> {
    /// Who submitted the job.
    pub source: JobSource,
    /// Routing configuration in effect.
    pub settings: &'a JobRoutingConfig,
    /// Explicit job type, if the submission carried one.
    pub job_type: Option<JobType>,
}

/// The chosen strategy and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// Job type after normalization.
    pub job_type: JobType,
    /// Strategy to run.
    pub resolved_orchestrator: OrchestratorKind,
    /// Names the configuration path consulted and its value.
    pub reason: String,
}

/// Pick the strategy for a job.
///
/// A missing job type is normalized from the source (`user` → interactive,
/// `scheduler` → scheduled-generic). Deterministic and side-effect free.
pub fn resolve_orchestrator_for_job(request: &RoutingRequest<'_>) -> RoutingDecision {
    let job_type = request
        .job_type
        .unwrap_or_else(|| request.source.default_job_type());
    let routing = request.settings;

    let (resolved, path, label) = match job_type {
        JobType::Interactive => (routing.interactive, "interactive", "Interactive job"),
        JobType::ScheduledGeneric => (
            routing.scheduled.generic,
            "scheduled.generic",
            "Scheduled generic job",
        ),
        JobType::ScheduledCi => (routing.scheduled.ci, "scheduled.ci", "Scheduled CI job"),
        JobType::ScheduledReport => (
            routing.scheduled.report,
            "scheduled.report",
            "Scheduled report job",
        ),
        JobType::ScheduledDeploy => (
            routing.scheduled.deploy,
            "scheduled.deploy",
            "Scheduled deploy job",
        ),
    };

    RoutingDecision {
        job_type,
        resolved_orchestrator: resolved,
        reason: format!("{label} routed by settings.job_routing.{path}={resolved}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(
        source: JobSource,
        job_type: Option<JobType>,
        settings: &JobRoutingConfig,
    ) -> RoutingDecision {
        resolve_orchestrator_for_job(&RoutingRequest {
            source,
            settings,
            job_type,
        })
    }

    #[test]
    fn test_user_defaults_to_agentic() {
        let decision = resolve(JobSource::User, None, &JobRoutingConfig::default());
        assert_eq!(decision.job_type, JobType::Interactive);
        assert_eq!(decision.resolved_orchestrator, OrchestratorKind::Agentic);
        assert_eq!(
            decision.reason,
            "Interactive job routed by settings.job_routing.interactive=agentic"
        );
    }

    #[test]
    fn test_scheduler_defaults_to_generic_deterministic() {
        let decision = resolve(JobSource::Scheduler, None, &JobRoutingConfig::default());
        assert_eq!(decision.job_type, JobType::ScheduledGeneric);
        assert_eq!(
            decision.resolved_orchestrator,
            OrchestratorKind::Deterministic
        );
        assert!(
            decision
                .reason
                .contains("settings.job_routing.scheduled.generic=deterministic")
        );
    }

    #[test]
    fn test_scheduled_ci_follows_configuration() {
        let mut settings = JobRoutingConfig::default();
        let decision = resolve(JobSource::Scheduler, Some(JobType::ScheduledCi), &settings);
        assert_eq!(
            decision.resolved_orchestrator,
            OrchestratorKind::Deterministic
        );

        settings.scheduled.ci = OrchestratorKind::Agentic;
        let decision = resolve(JobSource::Scheduler, Some(JobType::ScheduledCi), &settings);
        assert_eq!(decision.resolved_orchestrator, OrchestratorKind::Agentic);
        assert_eq!(
            decision.reason,
            "Scheduled CI job routed by settings.job_routing.scheduled.ci=agentic"
        );
    }

    #[test]
    fn test_each_scheduled_subtype_reads_its_own_field() {
        let mut settings = JobRoutingConfig::default();
        settings.scheduled.report = OrchestratorKind::Agentic;

        let report = resolve(
            JobSource::Scheduler,
            Some(JobType::ScheduledReport),
            &settings,
        );
        let deploy = resolve(
            JobSource::Scheduler,
            Some(JobType::ScheduledDeploy),
            &settings,
        );

        assert_eq!(report.resolved_orchestrator, OrchestratorKind::Agentic);
        assert_eq!(
            deploy.resolved_orchestrator,
            OrchestratorKind::Deterministic
        );
        assert!(deploy.reason.contains("scheduled.deploy"));
    }

    #[test]
    fn test_interactive_override() {
        let mut settings = JobRoutingConfig::default();
        settings.interactive = OrchestratorKind::Deterministic;
        let decision = resolve(JobSource::User, None, &settings);
        assert_eq!(
            decision.resolved_orchestrator,
            OrchestratorKind::Deterministic
        );
        assert!(decision.reason.ends_with("interactive=deterministic"));
    }
}
