//! Priority job queue with idempotency, memory backpressure and crash recovery.
//!
//! All bookkeeping lives behind one mutex that is never held across an
//! await. A dispatcher task, started by [`JobQueue::init`], wakes on every
//! enqueue, cancel and completion, and starts pending jobs until the
//! effective concurrency limit is reached. There is no polling, so a pause
//! caused by low memory with no job running lasts until the next wake-up.
//! Store writes go through a single writer task so they land in the order
//! the state changed.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Notify, OnceCell, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use swarm_core::config::queue::QueueConfig;
use swarm_core::config::routing::JobRoutingConfig;
use swarm_core::error::AppError;
use swarm_core::events::{LifecycleEvent, NotificationLevel};
use swarm_core::result::AppResult;
use swarm_core::traits::{Broadcaster, JobStore, MemoryStatsProvider};
use swarm_core::types::{EnqueueParams, Job, JobStatus, JobUpdate, MemoryStats, PipelineResult};
use swarm_orchestrator::{
    OrchestratorRegistry, PipelineError, ProgressReporter, RoutingRequest, RunOptions,
    resolve_orchestrator_for_job,
};

use crate::memory::effective_concurrency_limit;

/// Dispatch order: higher priority first, then insertion order.
type PendingKey = (Reverse<i32>, i64);

/// How a dispatched run ended.
#[derive(Debug)]
enum RunOutcome {
    Completed(PipelineResult),
    Failed(String),
    /// Stopped by shutdown; left `running` so the next start re-queues it.
    Interrupted,
}

enum PersistCommand {
    Save(Box<Job>),
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<String, Job>,
    pending: BTreeMap<PendingKey, String>,
    pending_keys: HashMap<String, PendingKey>,
    next_seq: i64,
    /// Running job id → its cancellation token.
    active: HashMap<String, CancellationToken>,
    /// `(session, trimmed key)` → id of the queued or running job holding it.
    idempotency: HashMap<(String, String), String>,
    stopping: bool,
}

impl QueueState {
    fn push_pending(&mut self, job: &Job, seq: i64) {
        let key = (Reverse(job.priority), seq);
        self.pending.insert(key, job.id.clone());
        self.pending_keys.insert(job.id.clone(), key);
    }

    fn remove_pending(&mut self, id: &str) -> bool {
        match self.pending_keys.remove(id) {
            Some(key) => self.pending.remove(&key).is_some(),
            None => false,
        }
    }

    fn pop_pending(&mut self) -> Option<String> {
        let (_, id) = self.pending.pop_first()?;
        self.pending_keys.remove(&id);
        Some(id)
    }

    fn reserve(&mut self, job: &Job) {
        if let Some(slot) = job.idempotency_slot() {
            self.idempotency.insert(slot, job.id.clone());
        }
    }

    /// Release the job's reservation if it still holds it.
    fn release(&mut self, job: &Job) {
        if let Some(slot) = job.idempotency_slot() {
            if self.idempotency.get(&slot) == Some(&job.id) {
                self.idempotency.remove(&slot);
            }
        }
    }

    /// The queued or running job holding this reservation, if any.
    fn holder(&self, slot: &(String, String)) -> Option<&Job> {
        self.idempotency
            .get(slot)
            .and_then(|id| self.jobs.get(id))
            .filter(|job| job.status.is_active())
    }

    fn counts(&self) -> LifecycleEvent {
        LifecycleEvent::ActiveJobsCount {
            active: self.active.len(),
            queued: self.pending.len(),
        }
    }
}

struct QueueInner {
    config: QueueConfig,
    routing: JobRoutingConfig,
    registry: OrchestratorRegistry,
    store: Arc<dyn JobStore>,
    broadcaster: Arc<dyn Broadcaster>,
    memory: Arc<dyn MemoryStatsProvider>,
    state: Mutex<QueueState>,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
    /// Wakes the dispatcher.
    wake: Notify,
    /// Signalled whenever a run returns.
    idle: Notify,
    /// Stops the dispatcher.
    shutdown: CancellationToken,
    initialized: OnceCell<()>,
}

impl std::fmt::Debug for QueueInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.config)
            .field("routing", &self.routing)
            .finish()
    }
}

/// The job queue.
///
/// Cheap to clone; every clone shares the same state. Construct one per
/// process and hand it to every consumer.
#[derive(Debug, Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    /// Create a queue. Must be called from within a Tokio runtime.
    ///
    /// Submissions are accepted immediately; nothing is dispatched until
    /// [`init`](Self::init) has run.
    pub fn new(
        config: QueueConfig,
        routing: JobRoutingConfig,
        registry: OrchestratorRegistry,
        store: Arc<dyn JobStore>,
        broadcaster: Arc<dyn Broadcaster>,
        memory: Arc<dyn MemoryStatsProvider>,
    ) -> Self {
        let persist_tx = spawn_writer(Arc::clone(&store));
        Self {
            inner: Arc::new(QueueInner {
                config,
                routing,
                registry,
                store,
                broadcaster,
                memory,
                state: Mutex::new(QueueState::default()),
                persist_tx,
                wake: Notify::new(),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
                initialized: OnceCell::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Queue a store write. Call while holding the state lock so writes
    /// reach the writer in the order the state changed.
    fn persist(&self, job: &Job) {
        if self
            .inner
            .persist_tx
            .send(PersistCommand::Save(Box::new(job.clone())))
            .is_err()
        {
            warn!("Job store writer stopped; job {} not persisted", job.id);
        }
    }

    fn emit(&self, event: LifecycleEvent) {
        self.inner.broadcaster.broadcast(event);
    }

    fn notify(&self, level: NotificationLevel, title: &str, message: String, job_id: &str) {
        self.emit(LifecycleEvent::Notification {
            level,
            title: title.to_string(),
            message,
            job_id: Some(job_id.to_string()),
        });
    }

    // ── Submission ───────────────────────────────────────────────

    /// Submit a job.
    ///
    /// If a job with the same `(session_id, trimmed idempotency_key)` is
    /// queued or running, that job is returned unchanged. Fails with
    /// `ServiceUnavailable` once [`shutdown`](Self::shutdown) has begun.
    pub fn enqueue(&self, params: EnqueueParams) -> AppResult<Job> {
        params.validate()?;

        let (job, queue_depth, counts) = {
            let mut state = self.state();
            if state.stopping {
                return Err(AppError::service_unavailable(
                    "Job queue is shut down and accepts no new jobs",
                ));
            }

            let job = params.into_job();
            if let Some(existing) = job.idempotency_slot().and_then(|slot| state.holder(&slot)) {
                debug!(
                    "Duplicate submission for session '{}'; returning job {}",
                    existing.session_id, existing.id
                );
                return Ok(existing.clone());
            }
            if state.jobs.contains_key(&job.id) {
                return Err(AppError::conflict(format!(
                    "Job '{}' already exists",
                    job.id
                )));
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.push_pending(&job, seq);
            state.reserve(&job);
            state.jobs.insert(job.id.clone(), job.clone());
            self.persist(&job);
            (job, state.pending.len(), state.counts())
        };

        info!(
            "Enqueued job: id={}, session='{}', mode={}, source={:?}, priority={}",
            job.id,
            job.session_id,
            job.mode.as_str(),
            job.source,
            job.priority
        );

        self.emit(LifecycleEvent::JobStatus { job: job.clone() });
        self.emit(LifecycleEvent::JobQueued {
            job_id: job.id.clone(),
            session_id: job.session_id.clone(),
            queue_depth,
        });
        self.emit(counts);
        self.inner.wake.notify_one();

        Ok(job)
    }

    /// Submit a fresh copy of a failed or cancelled job.
    pub fn retry_job(&self, id: &str) -> AppResult<Job> {
        let original = self
            .get_job(id)
            .ok_or_else(|| AppError::not_found(format!("Job '{id}' not found")))?;
        if !matches!(original.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(AppError::conflict(format!(
                "Job '{id}' is {} and cannot be retried",
                original.status
            )));
        }

        info!("Retrying job {}", id);
        self.enqueue(EnqueueParams {
            id: None,
            session_id: original.session_id,
            prompt: original.prompt,
            mode: original.mode,
            source: Some(original.source),
            job_type: original.job_type,
            priority: Some(original.priority),
            idempotency_key: original.idempotency_key,
            attachments: original.attachments,
        })
    }

    // ── Cancellation and updates ─────────────────────────────────

    /// Cancel a job.
    ///
    /// A queued job is removed from the pending set. A running job is marked
    /// cancelled and its token is triggered; the strategy stops at its next
    /// checkpoint and its slot frees when `run` returns. Returns `false` for
    /// unknown ids and jobs already in a terminal state.
    pub fn cancel_job(&self, id: &str) -> bool {
        let (job, counts) = {
            let mut state = self.state();
            let Some(status) = state.jobs.get(id).map(|j| j.status) else {
                return false;
            };

            match status {
                JobStatus::Queued => {
                    state.remove_pending(id);
                }
                JobStatus::Running => {
                    if let Some(token) = state.active.get(id) {
                        token.cancel();
                    }
                }
                _ => return false,
            }

            let Some(job) = state.jobs.get_mut(id) else {
                return false;
            };
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            let job = job.clone();
            state.release(&job);
            self.persist(&job);
            (job, state.counts())
        };

        info!(
            "Cancelled job {} (was {})",
            id,
            if job.started_at.is_some() { "running" } else { "queued" }
        );

        self.emit(LifecycleEvent::JobStatus { job });
        self.emit(counts);
        self.inner.wake.notify_one();
        true
    }

    /// Cancel every queued job. Running jobs are untouched.
    pub fn cancel_all_queued(&self) -> usize {
        let (cancelled, counts) = {
            let mut state = self.state();
            let now = Utc::now();
            let mut cancelled = Vec::with_capacity(state.pending.len());
            while let Some(id) = state.pop_pending() {
                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };
                if job.status != JobStatus::Queued {
                    continue;
                }
                job.status = JobStatus::Cancelled;
                job.completed_at = Some(now);
                let job = job.clone();
                state.release(&job);
                self.persist(&job);
                cancelled.push(job);
            }
            (cancelled, state.counts())
        };

        let count = cancelled.len();
        if count > 0 {
            info!("Cancelled {} queued jobs", count);
        }
        for job in cancelled {
            self.emit(LifecycleEvent::JobStatus { job });
        }
        self.emit(counts);
        count
    }

    /// Apply a typed update. Returns the job after the update, or `None`
    /// for an unknown id.
    pub fn update_job(&self, id: &str, update: JobUpdate) -> Option<Job> {
        let (job, changed) = {
            let mut state = self.state();
            let job = state.jobs.get_mut(id)?;
            let changed = job.apply(&update);
            let job = job.clone();
            if changed {
                self.persist(&job);
            }
            (job, changed)
        };

        if changed {
            self.emit(LifecycleEvent::JobStatus { job: job.clone() });
        }
        Some(job)
    }

    // ── Accessors ────────────────────────────────────────────────

    /// A job by id.
    pub fn get_job(&self, id: &str) -> Option<Job> {
        self.state().jobs.get(id).cloned()
    }

    /// Every known job, oldest first.
    pub fn get_all_jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.state().jobs.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Jobs of one session, oldest first.
    pub fn get_jobs_for_session(&self, session_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .state()
            .jobs
            .values()
            .filter(|job| job.session_id == session_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Jobs currently running.
    pub fn get_active_job_count(&self) -> usize {
        self.state().active.len()
    }

    /// Jobs waiting to be dispatched.
    pub fn get_queue_depth(&self) -> usize {
        self.state().pending.len()
    }

    /// Ids of running jobs, sorted.
    pub fn get_active_job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state().active.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// 1-based dispatch position of a queued job.
    pub fn queue_position(&self, id: &str) -> Option<usize> {
        self.state()
            .pending
            .values()
            .position(|pending| pending == id)
            .map(|index| index + 1)
    }

    /// Current system memory.
    pub fn get_memory_stats(&self) -> MemoryStats {
        self.inner.memory.memory_stats()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Load persisted jobs and start dispatching. Later calls do nothing.
    ///
    /// Jobs persisted as `running` belonged to a process that is gone; they
    /// are demoted to `queued` and dispatched again. Jobs already held in
    /// memory are kept as they are, and a recovered job whose idempotency
    /// key is held by one of them is cancelled.
    pub async fn init(&self) {
        self.inner
            .initialized
            .get_or_init(|| async {
                self.recover().await;
                self.spawn_dispatcher();
            })
            .await;
    }

    async fn recover(&self) {
        let mut persisted = match self.inner.store.get_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Failed to load persisted jobs, starting empty: {}", e);
                Vec::new()
            }
        };
        persisted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let (changed, demoted, superseded, restored, counts) = {
            let mut state = self.state();
            let mut changed = Vec::new();
            let (mut demoted, mut superseded, mut restored) = (0usize, 0usize, 0usize);
            // Negative sequence numbers keep recovered jobs ahead of anything
            // submitted in this process at the same priority.
            let base = -(persisted.len() as i64);

            for (index, mut job) in persisted.into_iter().enumerate() {
                if state.jobs.contains_key(&job.id) {
                    continue;
                }
                if job.status.is_active() {
                    let holder = job
                        .idempotency_slot()
                        .and_then(|slot| state.holder(&slot))
                        .map(|holder| holder.id.clone());

                    if let Some(holder) = holder {
                        // At most one active job per key: the job already
                        // holding it wins.
                        warn!(
                            "Recovered job {} shares its idempotency key with active job {}; cancelling it",
                            job.id, holder
                        );
                        job.status = JobStatus::Cancelled;
                        job.completed_at = Some(Utc::now());
                        job.error = Some(format!("Superseded by job {holder}"));
                        self.persist(&job);
                        changed.push(job.clone());
                        superseded += 1;
                    } else {
                        if job.status == JobStatus::Running {
                            job.status = JobStatus::Queued;
                            job.started_at = None;
                            self.persist(&job);
                            changed.push(job.clone());
                            demoted += 1;
                        }
                        state.push_pending(&job, base + index as i64);
                        state.reserve(&job);
                    }
                }
                state.jobs.insert(job.id.clone(), job);
                restored += 1;
            }
            (changed, demoted, superseded, restored, state.counts())
        };

        info!(
            "Job queue initialized: {} jobs restored, {} interrupted jobs re-queued, {} superseded",
            restored, demoted, superseded
        );
        for job in changed {
            self.emit(LifecycleEvent::JobStatus { job });
        }
        self.emit(counts);
    }

    fn spawn_dispatcher(&self) {
        let queue = self.clone();
        tokio::spawn(async move {
            debug!("Job dispatcher started");
            loop {
                queue.dispatch_ready();
                tokio::select! {
                    _ = queue.inner.shutdown.cancelled() => break,
                    _ = queue.inner.wake.notified() => {}
                }
            }
            debug!("Job dispatcher stopped");
        });
    }

    /// Start pending jobs until the pending set is empty or the limit is hit.
    fn dispatch_ready(&self) {
        loop {
            let stats = self.inner.memory.memory_stats();
            let (job, token, counts) = {
                let mut state = self.state();
                if state.stopping || state.pending.is_empty() {
                    return;
                }
                let active = state.active.len();
                let limit = effective_concurrency_limit(&stats, active, &self.inner.config);
                if active >= limit {
                    debug!(
                        "Dispatch paused: active={}, limit={}, free_mb={}, queued={}",
                        active,
                        limit,
                        stats.free_mb(),
                        state.pending.len()
                    );
                    return;
                }

                let Some(id) = state.pop_pending() else {
                    return;
                };
                let Some(job) = state.jobs.get_mut(&id) else {
                    continue;
                };
                if job.status != JobStatus::Queued {
                    continue;
                }
                job.status = JobStatus::Running;
                job.started_at = Some(Utc::now());
                let job = job.clone();
                self.persist(&job);
                let token = CancellationToken::new();
                state.active.insert(id, token.clone());
                (job, token, state.counts())
            };

            self.start(job, token, counts);
        }
    }

    fn start(&self, job: Job, token: CancellationToken, counts: LifecycleEvent) {
        let decision = resolve_orchestrator_for_job(&RoutingRequest {
            source: job.source,
            settings: &self.inner.routing,
            job_type: job.job_type,
        });
        info!(
            "Starting job {} with {} orchestrator: {}",
            job.id, decision.resolved_orchestrator, decision.reason
        );

        self.emit(LifecycleEvent::JobStatus { job: job.clone() });
        self.emit(LifecycleEvent::JobStarted {
            job_id: job.id.clone(),
            session_id: job.session_id.clone(),
            orchestrator: decision.resolved_orchestrator,
            reason: decision.reason,
        });
        self.emit(counts);

        let orchestrator = self.inner.registry.get(decision.resolved_orchestrator);
        let reporter = {
            let queue = self.clone();
            let job_id = job.id.clone();
            ProgressReporter::new(move |update| {
                queue.update_job(&job_id, update);
            })
        };
        let options = RunOptions {
            job_id: job.id.clone(),
            session_id: job.session_id,
            prompt: job.prompt,
            mode: job.mode,
            attachments: job.attachments,
            cancel: token,
            progress: reporter,
        };

        let queue = self.clone();
        let job_id = job.id;
        tokio::spawn(async move {
            // A panicking strategy must still free its slot.
            let run = tokio::spawn(async move { orchestrator.run(options).await });
            let outcome = match run.await {
                Ok(Ok(result)) => RunOutcome::Completed(result),
                Ok(Err(PipelineError::Cancelled)) if queue.is_stopping() => {
                    RunOutcome::Interrupted
                }
                Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
                Err(e) => RunOutcome::Failed(panic_message(e)),
            };
            queue.finish(&job_id, outcome);
        });
    }

    fn is_stopping(&self) -> bool {
        self.state().stopping
    }

    fn finish(&self, id: &str, outcome: RunOutcome) {
        let (job, counts) = {
            let mut state = self.state();
            state.active.remove(id);
            let counts = state.counts();

            let Some(job) = state.jobs.get_mut(id) else {
                return;
            };
            if job.status.is_terminal() {
                info!(
                    "Job {} returned after reaching {}; result discarded",
                    id, job.status
                );
                drop(state);
                self.after_run(counts);
                return;
            }

            match &outcome {
                RunOutcome::Completed(_) => {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.completed_at = Some(Utc::now());
                }
                RunOutcome::Failed(message) => {
                    job.status = JobStatus::Failed;
                    job.error = Some(message.clone());
                    job.completed_at = Some(Utc::now());
                }
                RunOutcome::Interrupted => {
                    info!(
                        "Job {} interrupted by shutdown; it will be re-queued on restart",
                        id
                    );
                    drop(state);
                    self.after_run(counts);
                    return;
                }
            }
            let job = job.clone();
            state.release(&job);
            self.persist(&job);
            (job, counts)
        };

        self.emit(LifecycleEvent::JobStatus { job: job.clone() });
        match outcome {
            RunOutcome::Completed(result) => {
                info!(
                    "Job {} completed (confidence {:.2}, validation {})",
                    job.id,
                    result.confidence,
                    if result.validation_passed { "passed" } else { "failed" }
                );
                self.emit(LifecycleEvent::PipelineResult {
                    job_id: job.id.clone(),
                    session_id: job.session_id.clone(),
                    result,
                });
                self.notify(
                    NotificationLevel::Success,
                    "Job completed",
                    format!("Job {} finished successfully", job.id),
                    &job.id,
                );
            }
            RunOutcome::Failed(message) => {
                error!("Job {} failed: {}", job.id, message);
                self.emit(LifecycleEvent::PipelineError {
                    job_id: job.id.clone(),
                    session_id: job.session_id.clone(),
                    error: message.clone(),
                });
                self.notify(
                    NotificationLevel::Error,
                    "Job failed",
                    format!("Job {} failed: {}", job.id, message),
                    &job.id,
                );
            }
            RunOutcome::Interrupted => {}
        }
        self.after_run(counts);
    }

    fn after_run(&self, counts: LifecycleEvent) {
        self.emit(counts);
        self.inner.idle.notify_waiters();
        self.inner.wake.notify_one();
    }

    /// Wait until every state change so far has reached the store.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.persist_tx.send(PersistCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Stop dispatching, signal every running job and wait up to the
    /// configured grace period for them to return.
    pub async fn shutdown(&self) {
        let tokens: Vec<CancellationToken> = {
            let mut state = self.state();
            state.stopping = true;
            state.active.values().cloned().collect()
        };
        self.inner.shutdown.cancel();

        if !tokens.is_empty() {
            info!("Signalling {} running jobs to stop", tokens.len());
        }
        for token in tokens {
            token.cancel();
        }

        let grace = Duration::from_secs(self.inner.config.shutdown_grace_seconds);
        let drained = tokio::time::timeout(grace, async {
            loop {
                let idle = self.inner.idle.notified();
                if self.state().active.is_empty() {
                    break;
                }
                idle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "{} jobs still running after {}s grace period",
                self.get_active_job_count(),
                grace.as_secs()
            );
        }
        self.flush().await;
        info!("Job queue shut down");
    }
}

fn spawn_writer(store: Arc<dyn JobStore>) -> mpsc::UnboundedSender<PersistCommand> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                PersistCommand::Save(job) => {
                    if let Err(e) = store.save_job(&job).await {
                        warn!("Failed to persist job {}: {}", job.id, e);
                    }
                }
                PersistCommand::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
    });
    tx
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "Pipeline task was aborted".to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Pipeline panicked: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Pipeline panicked: {message}")
    } else {
        "Pipeline panicked".to_string()
    }
}
