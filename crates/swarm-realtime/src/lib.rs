//! Lifecycle event fan-out for the swarm job engine.
//!
//! The job queue publishes through the [`Broadcaster`](swarm_core::traits::Broadcaster)
//! trait; transports (WebSocket handlers, log sinks) subscribe to the
//! [`EventBus`] and forward events however they like.

pub mod bus;

pub use bus::EventBus;
