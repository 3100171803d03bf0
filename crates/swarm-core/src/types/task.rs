//! Recurring task definitions and the fixed interval table.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobMode, JobType};
use crate::error::AppError;
use crate::result::AppResult;

/// The named intervals a task can recur on.
///
/// This is a closed lookup table, not a cron parser. Each interval accepts
/// a name and the cron literal conventionally written for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScheduleInterval {
    /// Every hour.
    Hourly,
    /// Every six hours.
    EverySixHours,
    /// Every 24 hours.
    Daily,
    /// Every seven days.
    Weekly,
}

impl ScheduleInterval {
    /// Look up an expression in the table.
    pub fn parse(expression: &str) -> Option<Self> {
        match expression.trim() {
            "hourly" | "0 * * * *" => Some(Self::Hourly),
            "every-6-hours" | "0 */6 * * *" => Some(Self::EverySixHours),
            "daily" | "0 0 * * *" => Some(Self::Daily),
            "weekly" | "0 0 * * 0" => Some(Self::Weekly),
            _ => None,
        }
    }

    /// Resolve an expression, falling back to [`ScheduleInterval::Daily`].
    pub fn from_expression(expression: &str) -> Self {
        Self::parse(expression).unwrap_or_else(|| {
            tracing::warn!(
                "Unrecognized schedule expression '{}', falling back to daily",
                expression
            );
            Self::Daily
        })
    }

    /// Length of one period.
    pub fn duration(&self) -> Duration {
        const HOUR: u64 = 60 * 60;
        match self {
            Self::Hourly => Duration::from_secs(HOUR),
            Self::EverySixHours => Duration::from_secs(6 * HOUR),
            Self::Daily => Duration::from_secs(24 * HOUR),
            Self::Weekly => Duration::from_secs(7 * 24 * HOUR),
        }
    }
}

/// A named recurring definition that periodically submits jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Unique task identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Interval expression; see [`ScheduleInterval::parse`].
    pub cron_expression: String,
    /// Prompt submitted on every firing.
    pub prompt: String,
    /// Mode submitted on every firing.
    pub mode: JobMode,
    /// Routing category of the jobs this task submits.
    #[serde(default = "default_task_job_type")]
    pub job_type: JobType,
    /// Whether the task is armed.
    pub enabled: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task last fired.
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
    /// When the task fires next.
    pub next_run: DateTime<Utc>,
}

impl ScheduledTask {
    /// The interval this task's expression resolves to.
    pub fn interval(&self) -> ScheduleInterval {
        ScheduleInterval::from_expression(&self.cron_expression)
    }

    /// Set `next_run` one interval after `now`.
    pub fn reschedule_from(&mut self, now: DateTime<Utc>) {
        self.next_run = next_run_after(&self.cron_expression, now);
    }
}

/// `now` plus one interval of `expression`.
pub fn next_run_after(expression: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    let interval = ScheduleInterval::from_expression(expression).duration();
    now + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::days(1))
}

fn default_task_job_type() -> JobType {
    JobType::ScheduledGeneric
}

/// Data required to create a scheduled task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScheduledTask {
    /// Display name.
    pub name: String,
    /// Interval expression.
    pub cron_expression: String,
    /// Prompt submitted on every firing.
    pub prompt: String,
    /// Mode submitted on every firing.
    #[serde(default)]
    pub mode: JobMode,
    /// Routing category; defaults to `scheduled-generic`.
    #[serde(default = "default_task_job_type")]
    pub job_type: JobType,
    /// Whether the task starts armed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewScheduledTask {
    /// Reject definitions that must never be stored.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("task name must not be empty"));
        }
        if self.prompt.trim().is_empty() {
            return Err(AppError::validation("task prompt must not be empty"));
        }
        Ok(())
    }
}

/// Partial update of a scheduled task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    /// New display name.
    #[serde(default)]
    pub name: Option<String>,
    /// New interval expression.
    #[serde(default)]
    pub cron_expression: Option<String>,
    /// New prompt.
    #[serde(default)]
    pub prompt: Option<String>,
    /// New mode.
    #[serde(default)]
    pub mode: Option<JobMode>,
    /// Enable or disable.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl TaskPatch {
    /// A patch that only toggles `enabled`.
    pub fn enabled(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            ..Default::default()
        }
    }

    /// Apply the patch, recomputing `next_run` relative to `now` when the
    /// task is being enabled, or stays enabled under a new expression.
    pub fn apply_to(&self, task: &mut ScheduledTask, now: DateTime<Utc>) {
        let was_enabled = task.enabled;
        let expression_changed = self
            .cron_expression
            .as_ref()
            .is_some_and(|expr| *expr != task.cron_expression);

        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(expr) = &self.cron_expression {
            task.cron_expression = expr.clone();
        }
        if let Some(prompt) = &self.prompt {
            task.prompt = prompt.clone();
        }
        if let Some(mode) = self.mode {
            task.mode = mode;
        }
        if let Some(enabled) = self.enabled {
            task.enabled = enabled;
        }

        let enabling = self.enabled == Some(true);
        let stays_enabled = was_enabled && task.enabled;
        if enabling || (stays_enabled && expression_changed) {
            task.reschedule_from(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(expr: &str, enabled: bool) -> ScheduledTask {
        let created = Utc::now() - chrono::Duration::days(30);
        ScheduledTask {
            id: "t1".to_string(),
            name: "nightly".to_string(),
            cron_expression: expr.to_string(),
            prompt: "summarize".to_string(),
            mode: JobMode::Research,
            job_type: JobType::ScheduledReport,
            enabled,
            created_at: created,
            last_run: None,
            next_run: created,
        }
    }

    #[test]
    fn test_interval_table() {
        assert_eq!(ScheduleInterval::parse("hourly"), Some(ScheduleInterval::Hourly));
        assert_eq!(
            ScheduleInterval::parse("0 */6 * * *"),
            Some(ScheduleInterval::EverySixHours)
        );
        assert_eq!(ScheduleInterval::parse("weekly"), Some(ScheduleInterval::Weekly));
        assert_eq!(ScheduleInterval::parse("*/5 * * * *"), None);
    }

    #[test]
    fn test_unknown_expression_falls_back_to_daily() {
        let now = Utc::now();
        let next = next_run_after("every full moon", now);
        assert_eq!(next - now, chrono::Duration::hours(24));
    }

    #[test]
    fn test_enabling_resets_clock() {
        let now = Utc::now();
        let mut t = task("hourly", false);
        TaskPatch::enabled(true).apply_to(&mut t, now);
        assert!(t.enabled);
        assert_eq!(t.next_run, now + chrono::Duration::hours(1));
    }

    #[test]
    fn test_enabling_already_enabled_task_resets_clock() {
        let now = Utc::now();
        let mut t = task("daily", true);
        TaskPatch::enabled(true).apply_to(&mut t, now);
        assert_eq!(t.next_run, now + chrono::Duration::hours(24));
    }

    #[test]
    fn test_expression_change_on_enabled_task_recomputes() {
        let now = Utc::now();
        let mut t = task("daily", true);
        let patch = TaskPatch {
            cron_expression: Some("weekly".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut t, now);
        assert_eq!(t.next_run, now + chrono::Duration::days(7));
    }

    #[test]
    fn test_expression_change_on_disabled_task_keeps_next_run() {
        let now = Utc::now();
        let mut t = task("daily", false);
        let before = t.next_run;
        let patch = TaskPatch {
            cron_expression: Some("hourly".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut t, now);
        assert_eq!(t.cron_expression, "hourly");
        assert_eq!(t.next_run, before);
    }

    #[test]
    fn test_disabling_keeps_next_run() {
        let now = Utc::now();
        let mut t = task("daily", true);
        let before = t.next_run;
        let patch = TaskPatch {
            cron_expression: Some("hourly".to_string()),
            enabled: Some(false),
            ..Default::default()
        };
        patch.apply_to(&mut t, now);
        assert!(!t.enabled);
        assert_eq!(t.next_run, before);
    }

    #[test]
    fn test_rename_only_keeps_next_run() {
        let now = Utc::now();
        let mut t = task("daily", true);
        let before = t.next_run;
        let patch = TaskPatch {
            name: Some("renamed".to_string()),
            cron_expression: Some("daily".to_string()),
            ..Default::default()
        };
        patch.apply_to(&mut t, now);
        assert_eq!(t.name, "renamed");
        assert_eq!(t.next_run, before);
    }
}
