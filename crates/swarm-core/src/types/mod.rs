//! Domain types shared by every swarm crate.

pub mod job;
pub mod memory;
pub mod pipeline;
pub mod task;

pub use job::{
    Attachment, EnqueueParams, Job, JobMode, JobSource, JobStatus, JobType, JobUpdate,
};
pub use memory::MemoryStats;
pub use pipeline::{AgentSummary, PipelineResult};
pub use task::{NewScheduledTask, ScheduleInterval, ScheduledTask, TaskPatch};
