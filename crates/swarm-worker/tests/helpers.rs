//! Shared test helpers for queue and scheduler integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, broadcast};

use swarm_core::config::queue::QueueConfig;
use swarm_core::config::routing::{JobRoutingConfig, OrchestratorKind};
use swarm_core::events::LifecycleEvent;
use swarm_core::types::PipelineResult;
use swarm_orchestrator::{Orchestrator, OrchestratorRegistry, PipelineError, RunOptions};
use swarm_realtime::EventBus;
use swarm_store::MemoryStore;
use swarm_worker::{FixedMemoryProvider, JobQueue};

/// Prompt that makes the scripted orchestrator fail.
pub const FAIL: &str = "please fail";
/// Prompt that makes the scripted orchestrator panic.
pub const PANIC: &str = "please panic";

/// Shared run bookkeeping for both scripted strategies.
#[derive(Debug)]
pub struct Probe {
    running: AtomicUsize,
    max_running: AtomicUsize,
    gate: Semaphore,
}

impl Probe {
    fn new(gated: bool) -> Self {
        Self {
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            gate: Semaphore::new(if gated { 0 } else { Semaphore::MAX_PERMITS }),
        }
    }

    /// Let `n` gated runs finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Runs in progress right now.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous runs observed.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

/// Orchestrator that records its calls and finishes when the probe's gate
/// lets it, or when its job is cancelled.
#[derive(Debug)]
pub struct ScriptedOrchestrator {
    kind: OrchestratorKind,
    probe: Arc<Probe>,
    calls: Mutex<Vec<RunOptions>>,
}

impl ScriptedOrchestrator {
    fn new(kind: OrchestratorKind, probe: Arc<Probe>) -> Self {
        Self {
            kind,
            probe,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every run invocation so far.
    pub fn calls(&self) -> Vec<RunOptions> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts of every run invocation so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.prompt).collect()
    }
}

#[async_trait]
impl Orchestrator for ScriptedOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        self.kind
    }

    async fn run(&self, options: RunOptions) -> Result<PipelineResult, PipelineError> {
        self.calls.lock().unwrap().push(options.clone());
        let now = self.probe.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_running.fetch_max(now, Ordering::SeqCst);

        options.progress.stage("work", 50);

        let outcome = tokio::select! {
            _ = options.cancel.cancelled() => Err(PipelineError::Cancelled),
            permit = self.probe.gate.acquire() => {
                if let Ok(permit) = permit {
                    permit.forget();
                }
                if options.prompt == FAIL {
                    Err(PipelineError::Agent {
                        role: "implement".into(),
                        message: "compiler exploded".into(),
                    })
                } else if options.prompt == PANIC {
                    self.probe.running.fetch_sub(1, Ordering::SeqCst);
                    panic!("strategy bug");
                } else {
                    Ok(PipelineResult {
                        final_output: format!("done: {}", options.prompt),
                        confidence: 0.9,
                        agents: Vec::new(),
                        sources: Vec::new(),
                        validation_passed: true,
                    })
                }
            }
        };

        self.probe.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// A queue wired to in-memory collaborators.
pub struct TestApp {
    pub queue: JobQueue,
    pub store: MemoryStore,
    pub memory: Arc<FixedMemoryProvider>,
    pub probe: Arc<Probe>,
    pub agentic: Arc<ScriptedOrchestrator>,
    pub deterministic: Arc<ScriptedOrchestrator>,
    pub bus: EventBus,
    events: broadcast::Receiver<LifecycleEvent>,
}

impl TestApp {
    /// Runs finish as soon as they start.
    pub fn new(config: QueueConfig) -> Self {
        Self::build(config, false, MemoryStore::new())
    }

    /// Runs wait for [`Probe::release`].
    pub fn gated(config: QueueConfig) -> Self {
        Self::build(config, true, MemoryStore::new())
    }

    /// A gated app over an existing store.
    pub fn gated_with_store(config: QueueConfig, store: MemoryStore) -> Self {
        Self::build(config, true, store)
    }

    fn build(config: QueueConfig, gated: bool, store: MemoryStore) -> Self {
        let probe = Arc::new(Probe::new(gated));
        let agentic = Arc::new(ScriptedOrchestrator::new(
            OrchestratorKind::Agentic,
            Arc::clone(&probe),
        ));
        let deterministic = Arc::new(ScriptedOrchestrator::new(
            OrchestratorKind::Deterministic,
            Arc::clone(&probe),
        ));
        let memory = Arc::new(FixedMemoryProvider::new(8 * 1024, 16 * 1024));
        let bus = EventBus::new(4096);
        let events = bus.subscribe();

        let queue = JobQueue::new(
            config,
            JobRoutingConfig::default(),
            OrchestratorRegistry::new(deterministic.clone(), agentic.clone()),
            Arc::new(store.clone()),
            Arc::new(bus.clone()),
            memory.clone(),
        );

        Self {
            queue,
            store,
            memory,
            probe,
            agentic,
            deterministic,
            bus,
            events,
        }
    }

    /// Every event broadcast since the last call.
    pub fn drain_events(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Queue settings with a concurrency ceiling and default memory settings.
pub fn config(max_concurrent_jobs: usize) -> QueueConfig {
    QueueConfig {
        max_concurrent_jobs,
        shutdown_grace_seconds: 5,
        ..Default::default()
    }
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}
