//! Lifecycle event publisher trait.

use crate::events::LifecycleEvent;

/// Publishes lifecycle events to whatever transport is attached.
///
/// Publishing never blocks and never fails from the caller's point of view;
/// an event with no listeners is dropped.
pub trait Broadcaster: Send + Sync + std::fmt::Debug + 'static {
    /// Publish one event.
    fn broadcast(&self, event: LifecycleEvent);
}
