//! Recurring task scheduler that feeds the job queue.
//!
//! Each enabled task owns one single-shot timer. When it fires, the task is
//! submitted to the queue and only then re-armed, so a task never overlaps
//! itself. Timers carry a generation number: re-arming or clearing a task
//! bumps it, and a timer that wakes up with a stale generation does nothing.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::Utc;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use swarm_core::error::AppError;
use swarm_core::result::AppResult;
use swarm_core::traits::JobStore;
use swarm_core::types::task::next_run_after;
use swarm_core::types::{EnqueueParams, JobSource, NewScheduledTask, ScheduledTask, TaskPatch};

use crate::queue::JobQueue;

#[derive(Debug, Default)]
struct SchedulerState {
    tasks: HashMap<String, ScheduledTask>,
    /// Task id → (generation, timer).
    timers: HashMap<String, (u64, JoinHandle<()>)>,
    next_generation: u64,
    started: bool,
}

impl SchedulerState {
    fn clear_timer(&mut self, id: &str) {
        if let Some((_, handle)) = self.timers.remove(id) {
            handle.abort();
        }
    }
}

#[derive(Debug)]
struct SchedulerInner {
    store: Arc<dyn JobStore>,
    queue: JobQueue,
    state: Mutex<SchedulerState>,
    initialized: OnceCell<()>,
}

/// Holds recurring task definitions and submits their jobs on schedule.
///
/// Cheap to clone; every clone shares the same tasks and timers.
#[derive(Debug, Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler submitting to `queue`.
    pub fn new(store: Arc<dyn JobStore>, queue: JobQueue) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                store,
                queue,
                state: Mutex::new(SchedulerState::default()),
                initialized: OnceCell::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn persist(&self, task: &ScheduledTask) {
        if let Err(e) = self.inner.store.save_scheduled_task(task).await {
            warn!("Failed to persist scheduled task {}: {}", task.id, e);
        }
    }

    /// Load persisted tasks. Later calls do nothing.
    pub async fn init(&self) {
        self.inner
            .initialized
            .get_or_init(|| async {
                let persisted = match self.inner.store.get_scheduled_tasks().await {
                    Ok(tasks) => tasks,
                    Err(e) => {
                        warn!("Failed to load scheduled tasks: {}", e);
                        Vec::new()
                    }
                };

                let mut state = self.state();
                let mut loaded = 0usize;
                for task in persisted {
                    if !state.tasks.contains_key(&task.id) {
                        state.tasks.insert(task.id.clone(), task);
                        loaded += 1;
                    }
                }
                info!("Scheduler loaded {} scheduled tasks", loaded);
            })
            .await;
    }

    // ── CRUD ─────────────────────────────────────────────────────

    /// Create a task and arm it if enabled.
    pub async fn add_task(&self, new_task: NewScheduledTask) -> AppResult<ScheduledTask> {
        new_task.validate()?;

        let now = Utc::now();
        let task = ScheduledTask {
            id: Uuid::new_v4().to_string(),
            name: new_task.name,
            next_run: next_run_after(&new_task.cron_expression, now),
            cron_expression: new_task.cron_expression,
            prompt: new_task.prompt,
            mode: new_task.mode,
            job_type: new_task.job_type,
            enabled: new_task.enabled,
            created_at: now,
            last_run: None,
        };
        self.state().tasks.insert(task.id.clone(), task.clone());

        info!(
            "Added scheduled task '{}' ({}, {}, next run {})",
            task.name, task.id, task.cron_expression, task.next_run
        );
        self.persist(&task).await;
        self.rearm(&task.id);
        Ok(task)
    }

    /// Delete a task, clearing its timer first. Returns `false` for unknown ids.
    pub async fn remove_task(&self, id: &str) -> bool {
        let removed = {
            let mut state = self.state();
            state.clear_timer(id);
            state.tasks.remove(id)
        };
        let Some(task) = removed else {
            return false;
        };

        if let Err(e) = self.inner.store.delete_scheduled_task(id).await {
            warn!("Failed to delete scheduled task {}: {}", id, e);
        }
        info!("Removed scheduled task '{}' ({})", task.name, id);
        true
    }

    /// Enable a task; its run clock restarts from now.
    pub async fn enable_task(&self, id: &str) -> AppResult<ScheduledTask> {
        self.update_task(id, TaskPatch::enabled(true)).await
    }

    /// Disable a task and clear its timer.
    pub async fn disable_task(&self, id: &str) -> AppResult<ScheduledTask> {
        self.update_task(id, TaskPatch::enabled(false)).await
    }

    /// Apply a partial update.
    ///
    /// `next_run` is recomputed when the patch sets `enabled: true`, or when
    /// the task stays enabled and its expression changes.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> AppResult<ScheduledTask> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(AppError::validation("task name must not be empty"));
        }
        if patch.prompt.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(AppError::validation("task prompt must not be empty"));
        }

        let task = {
            let mut state = self.state();
            let task = state
                .tasks
                .get_mut(id)
                .ok_or_else(|| AppError::not_found(format!("Scheduled task '{id}' not found")))?;
            patch.apply_to(task, Utc::now());
            task.clone()
        };

        debug!(
            "Updated scheduled task {} (enabled={}, next run {})",
            id, task.enabled, task.next_run
        );
        self.persist(&task).await;
        self.rearm(id);
        Ok(task)
    }

    /// Every task, oldest first.
    pub fn get_tasks(&self) -> Vec<ScheduledTask> {
        let mut tasks: Vec<ScheduledTask> = self.state().tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks
    }

    /// A task by id.
    pub fn get_task(&self, id: &str) -> Option<ScheduledTask> {
        self.state().tasks.get(id).cloned()
    }

    // ── Timers ───────────────────────────────────────────────────

    /// Arm timers for every enabled task.
    pub fn start(&self) {
        let ids: Vec<String> = {
            let mut state = self.state();
            state.started = true;
            state
                .tasks
                .values()
                .filter(|task| task.enabled)
                .map(|task| task.id.clone())
                .collect()
        };
        for id in &ids {
            self.rearm(id);
        }
        info!("Scheduler started with {} armed tasks", ids.len());
    }

    /// Clear every timer. Safe to call repeatedly.
    pub fn stop(&self) {
        let mut state = self.state();
        state.started = false;
        let cleared = state.timers.len();
        for (_, (_, handle)) in state.timers.drain() {
            handle.abort();
        }
        if cleared > 0 {
            info!("Scheduler stopped, {} timers cleared", cleared);
        }
    }

    /// Whether timers are armed.
    pub fn is_started(&self) -> bool {
        self.state().started
    }

    /// Replace the task's timer according to its current state: armed at
    /// `next_run` if the scheduler is started and the task is enabled,
    /// cleared otherwise.
    fn rearm(&self, id: &str) {
        let mut state = self.state();
        state.clear_timer(id);

        let next_run = match state.tasks.get(id) {
            Some(task) if state.started && task.enabled => task.next_run,
            _ => return,
        };
        let delay = (next_run - Utc::now()).to_std().unwrap_or_default();

        state.next_generation += 1;
        let generation = state.next_generation;
        let weak = Arc::downgrade(&self.inner);
        let task_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire(weak, task_id, generation).await;
        });
        state.timers.insert(id.to_string(), (generation, handle));

        debug!("Armed task {} to fire in {:?}", id, delay);
    }

    // ── Execution ────────────────────────────────────────────────

    /// Submit one job for a task, then reschedule it.
    ///
    /// A task that was removed or disabled in the meantime is a no-op and
    /// returns `false`.
    pub async fn execute_task(&self, id: &str) -> bool {
        let task = match self.state().tasks.get(id) {
            Some(task) if task.enabled => task.clone(),
            Some(_) => {
                debug!("Skipping disabled scheduled task {}", id);
                return false;
            }
            None => {
                debug!("Skipping unknown scheduled task {}", id);
                return false;
            }
        };

        let params = EnqueueParams {
            session_id: format!("scheduler-{}", Uuid::new_v4()),
            prompt: task.prompt.clone(),
            mode: task.mode,
            source: Some(JobSource::Scheduler),
            job_type: Some(task.job_type),
            ..Default::default()
        };
        match self.inner.queue.enqueue(params) {
            Ok(job) => info!("Scheduled task '{}' submitted job {}", task.name, job.id),
            Err(e) => error!("Scheduled task '{}' failed to submit: {}", task.name, e),
        }

        let now = Utc::now();
        let updated = {
            let mut state = self.state();
            state.tasks.get_mut(id).map(|task| {
                task.last_run = Some(now);
                task.reschedule_from(now);
                task.clone()
            })
        };
        let Some(updated) = updated else {
            return true;
        };

        self.persist(&updated).await;
        self.rearm(id);
        true
    }

    /// Fire a task immediately; its timer restarts from now.
    pub async fn run_task_now(&self, id: &str) -> bool {
        self.execute_task(id).await
    }
}

/// Timer callback. Does nothing if the scheduler is gone or the timer was
/// superseded while sleeping.
async fn fire(inner: Weak<SchedulerInner>, id: String, generation: u64) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let scheduler = Scheduler { inner };
    {
        let mut state = scheduler.state();
        let current = state.timers.get(&id).map(|(g, _)| *g);
        if current != Some(generation) {
            warn!("Ignoring stale timer for scheduled task {}", id);
            return;
        }
        // Forget our own handle so re-arming does not abort this task.
        state.timers.remove(&id);
    }
    scheduler.execute_task(&id).await;
}
