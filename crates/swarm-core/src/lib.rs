//! # swarm-core
//!
//! Core crate for the swarm job engine. Contains configuration schemas,
//! the job and scheduled-task domain types, lifecycle events, the
//! collaborator traits the engine consumes (storage, broadcasting, memory
//! statistics), and the unified error system.
//!
//! This crate has **no** internal dependencies on other swarm crates.

pub mod config;
pub mod error;
pub mod events;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
