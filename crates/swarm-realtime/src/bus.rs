//! Broadcast-channel event bus for single-node deployments.

use tokio::sync::broadcast;
use tracing::trace;

use swarm_core::config::realtime::RealtimeConfig;
use swarm_core::events::LifecycleEvent;
use swarm_core::traits::Broadcaster;

/// In-memory lifecycle event bus.
///
/// Every subscriber sees every event published after it subscribed. A
/// subscriber that falls more than `capacity` events behind receives
/// `RecvError::Lagged` and skips ahead.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Create a bus from configuration.
    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.event_buffer)
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Broadcaster for EventBus {
    fn broadcast(&self, event: LifecycleEvent) {
        let event_type = event.event_type();
        if self.sender.send(event).is_err() {
            trace!(event_type, "No subscribers for lifecycle event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::events::NotificationLevel;

    fn counts(active: usize, queued: usize) -> LifecycleEvent {
        LifecycleEvent::ActiveJobsCount { active, queued }
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_events() {
        let bus = EventBus::new(16);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.broadcast(counts(1, 0));

        assert_eq!(a.recv().await.unwrap(), counts(1, 0));
        assert_eq!(b.recv().await.unwrap(), counts(1, 0));
    }

    #[tokio::test]
    async fn test_broadcast_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.broadcast(LifecycleEvent::Notification {
            level: NotificationLevel::Info,
            title: "t".into(),
            message: "m".into(),
            job_id: None,
        });

        let mut late = bus.subscribe();
        bus.broadcast(counts(0, 1));
        assert_eq!(late.recv().await.unwrap(), counts(0, 1));
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.broadcast(counts(i, 0));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        assert_eq!(rx.recv().await.unwrap(), counts(3, 0));
    }
}
