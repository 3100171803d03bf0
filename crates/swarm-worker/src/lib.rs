//! Job execution engine for the swarm runner.
//!
//! This crate provides:
//! - [`JobQueue`]: priority/idempotency-aware submission, memory-aware
//!   dispatch to an orchestrator, lifecycle tracking and crash recovery
//! - [`Scheduler`]: recurring task definitions that feed the queue
//! - System memory statistics backing the queue's backpressure

pub mod memory;
pub mod queue;
pub mod scheduler;

pub use memory::{FixedMemoryProvider, SystemMemoryProvider};
pub use queue::JobQueue;
pub use scheduler::Scheduler;
