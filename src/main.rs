//! Swarm Runner server: bounded-concurrency execution of multi-agent jobs.
//!
//! Main entry point that wires all crates together and runs until a
//! shutdown signal arrives.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{EnvFilter, fmt};

use swarm_core::config::AppConfig;
use swarm_core::error::AppError;
use swarm_orchestrator::{CommandAgentRunner, OrchestratorRegistry};
use swarm_realtime::EventBus;
use swarm_worker::{JobQueue, Scheduler, SystemMemoryProvider};

/// Swarm Runner: job queue and scheduler for multi-agent pipelines
#[derive(Debug, Parser)]
#[command(name = "swarm-server", version, about, long_about = None)]
struct Cli {
    /// Configuration overlay to apply on top of `config/default.toml`
    #[arg(short, long, env = "SWARM_ENV", default_value = "development")]
    env: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);
    tracing::info!("Configuration loaded (env: {})", cli.env);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Swarm Runner v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Job store ────────────────────────────────────────
    let store = swarm_store::create_store(&config.storage).await?;

    // ── Step 2: Event bus ────────────────────────────────────────
    let bus = EventBus::from_config(&config.realtime);
    let event_log = spawn_event_log(&bus);

    // ── Step 3: Orchestrators ────────────────────────────────────
    tracing::info!(
        "Agents run via '{}' (timeout {}s, validation threshold {})",
        config.pipeline.agent_command,
        config.pipeline.agent_timeout_seconds,
        config.pipeline.validation_threshold
    );
    let runner = Arc::new(CommandAgentRunner::new(&config.pipeline));
    let registry = OrchestratorRegistry::with_agent_runner(runner, &config.pipeline);

    // ── Step 4: Job queue ────────────────────────────────────────
    let memory = Arc::new(SystemMemoryProvider::new());
    let queue = JobQueue::new(
        config.queue.clone(),
        config.job_routing.clone(),
        registry,
        Arc::clone(&store),
        Arc::new(bus.clone()),
        memory,
    );
    queue.init().await;

    let stats = queue.get_memory_stats();
    tracing::info!(
        "Job queue ready: max_concurrent_jobs={}, memory {}/{} MiB free ({:.1}% used), {} queued",
        config.queue.max_concurrent_jobs,
        stats.free_mb(),
        stats.total_mb(),
        stats.usage_percent,
        queue.get_queue_depth()
    );

    // ── Step 5: Scheduler ────────────────────────────────────────
    let scheduler = Scheduler::new(Arc::clone(&store), queue.clone());
    scheduler.init().await;
    if config.scheduler.enabled {
        scheduler.start();
    } else {
        tracing::info!("Scheduler disabled by configuration");
    }

    // ── Step 6: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, starting graceful shutdown...");

    scheduler.stop();
    queue.shutdown().await;
    event_log.abort();

    tracing::info!("Swarm Runner shut down gracefully");
    Ok(())
}

/// Log every lifecycle event at debug level.
fn spawn_event_log(bus: &EventBus) -> tokio::task::JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    tracing::debug!(
                        event_type = event.event_type(),
                        job_id = event.job_id().unwrap_or("-"),
                        "Lifecycle event"
                    );
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
