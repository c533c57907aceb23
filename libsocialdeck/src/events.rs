//! In-process event bus
//!
//! The scheduler reports what it does through `tokio::sync::broadcast`, so
//! that a CLI can print progress while the daemon only logs. Emitting never
//! blocks: with no subscribers the event is dropped, and a lagging
//! subscriber misses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::types::Platform;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A generated post was added to the queue
    PostScheduled {
        post_id: String,
        platform: Platform,
        scheduled_time: chrono::DateTime<chrono::Utc>,
    },

    PostPublished {
        post_id: String,
        platform: Platform,
        platform_post_id: String,
    },

    PostFailed {
        post_id: String,
        platform: Platform,
        error: String,
    },

    /// A slot was skipped because content generation failed
    GenerationFailed { platform: Platform, error: String },

    /// The once-per-day scheduling pass finished
    DailyScheduleCompleted { date: String, scheduled: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let event = Event::PostFailed {
            post_id: "p1".to_string(),
            platform: Platform::Telegram,
            error: "chat not found".to_string(),
        };
        bus.emit(event.clone());

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::default();
        bus.emit(Event::DailyScheduleCompleted {
            date: "2026-10-19".to_string(),
            scheduled: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = Event::DailyScheduleCompleted {
            date: "2026-10-19".to_string(),
            scheduled: 4,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "daily_schedule_completed");
        assert_eq!(json["scheduled"], 4);
    }
}
