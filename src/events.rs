//! Lifecycle event publishing for the chunked processor.
//!
//! Observers (dashboards, progress notes) subscribe to a broadcast channel;
//! the engine publishes at every job and unit transition. Publishing with no
//! subscribers is deliberately not an error.

use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcast publisher for job and unit lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<LifecycleEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    /// Dot-namespaced event name, see [`crate::constants::events`]
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context.
    pub fn publish(&self, event_name: impl Into<String>, context: Value) {
        let event = LifecycleEvent {
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // send() errors only when there are no subscribers; we publish
        // regardless of whether anyone is listening.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let publisher = EventPublisher::new(16);
        publisher.publish("job.initialized", json!({"job_name": "test"}));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let publisher = EventPublisher::new(16);
        let mut rx = publisher.subscribe();

        publisher.publish("unit.completed", json!({"unit": "2025-05-01"}));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "unit.completed");
        assert_eq!(event.context["unit"], "2025-05-01");
    }
}
