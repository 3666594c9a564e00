//! Event types for the Forest Watch event system
//!
//! Job lifecycle events are broadcast through an [`EventBus`] and can be
//! serialized for SSE transmission. Polling the status endpoint remains the
//! primary way to follow a job; events are an additive push channel.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Forest Watch event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FwEvent {
    /// Analysis job accepted and queued
    JobSubmitted {
        job_id: Uuid,
        date_before: NaiveDate,
        date_after: NaiveDate,
        timestamp: DateTime<Utc>,
    },

    /// A pipeline stage finished and progress advanced
    JobProgress {
        job_id: Uuid,
        /// Stage that just completed
        stage: String,
        /// Progress after the stage (0-100)
        progress: u8,
        timestamp: DateTime<Utc>,
    },

    /// Job finished and results are retrievable
    JobCompleted {
        job_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Job failed; progress frozen at its last value
    JobFailed {
        job_id: Uuid,
        error: String,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
}

impl FwEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            FwEvent::JobSubmitted { .. } => "JobSubmitted",
            FwEvent::JobProgress { .. } => "JobProgress",
            FwEvent::JobCompleted { .. } => "JobCompleted",
            FwEvent::JobFailed { .. } => "JobFailed",
        }
    }

    /// Job the event refers to
    pub fn job_id(&self) -> Uuid {
        match self {
            FwEvent::JobSubmitted { job_id, .. }
            | FwEvent::JobProgress { job_id, .. }
            | FwEvent::JobCompleted { job_id, .. }
            | FwEvent::JobFailed { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast channel for [`FwEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FwEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow receivers
    /// start missing old events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<FwEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: FwEvent,
    ) -> Result<usize, broadcast::error::SendError<FwEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: FwEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = FwEvent::JobProgress {
            job_id: Uuid::nil(),
            stage: "retrieval".to_string(),
            progress: 30,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobProgress");
        assert_eq!(json["progress"], 30);
        assert_eq!(event.event_type(), "JobProgress");
    }

    #[test]
    fn test_emit_without_subscribers_errors_but_lossy_does_not() {
        let bus = EventBus::new(8);
        let event = FwEvent::JobCompleted {
            job_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };

        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 8);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        for progress in [30u8, 40, 70] {
            bus.emit_lossy(FwEvent::JobProgress {
                job_id,
                stage: "stage".to_string(),
                progress,
                timestamp: Utc::now(),
            });
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            if let FwEvent::JobProgress { progress, .. } = rx.recv().await.unwrap() {
                seen.push(progress);
            }
        }
        assert_eq!(seen, vec![30, 40, 70]);
    }
}
