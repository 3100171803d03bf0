//! Collaborator traits defined in `swarm-core` and implemented by other crates.

pub mod broadcaster;
pub mod memory;
pub mod store;

pub use broadcaster::Broadcaster;
pub use memory::MemoryStatsProvider;
pub use store::JobStore;
