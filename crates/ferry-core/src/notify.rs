//! User-facing sync events and the sinks that receive them

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{OperationId, OperationKind};

/// Something the host UI may want to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// Stored while offline; will be delivered later
    SavedOffline {
        id: OperationId,
        kind: OperationKind,
        message: String,
    },
    /// One operation reached the server
    Synced { id: OperationId, kind: OperationKind },
    /// Rejected or out of attempts; needs the host to decide what to do
    PermanentlyFailed {
        id: OperationId,
        kind: OperationKind,
        summary: String,
        reason: String,
    },
    /// Aggregate result of one pass
    PassCompleted {
        succeeded: usize,
        retried: usize,
        failed: usize,
    },
}

impl SyncEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SavedOffline { .. } => "saved-offline",
            Self::Synced { .. } => "synced",
            Self::PermanentlyFailed { .. } => "permanently-failed",
            Self::PassCompleted { .. } => "pass-completed",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::SavedOffline { message, .. } => message.clone(),
            Self::Synced { kind, .. } => format!("Synced {}", kind.label()),
            Self::PermanentlyFailed {
                summary, reason, ..
            } => format!("Failed to sync {summary}: {reason}"),
            Self::PassCompleted {
                succeeded, failed, ..
            } => match (succeeded, failed) {
                (0, 0) => "Nothing to sync".to_string(),
                (1, 0) => "Synced 1 change".to_string(),
                (n, 0) => format!("Synced {n} changes"),
                (n, f) => format!("Synced {n} changes, {f} failed"),
            },
        }
    }
}

/// Fire-and-forget destination for `SyncEvent`s.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &SyncEvent);
}

/// Fans events out to any number of async subscribers.
///
/// Events published with no live subscriber are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<SyncEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, event: &SyncEvent) {
        let _ = self.sender.send(event.clone());
    }
}

/// Writes every event to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, event: &SyncEvent) {
        match event {
            SyncEvent::PermanentlyFailed { id, .. } => {
                tracing::error!(event = event.name(), %id, "{}", event.message());
            }
            SyncEvent::Synced { id, .. } => {
                tracing::debug!(event = event.name(), %id, "{}", event.message());
            }
            _ => tracing::info!(event = event.name(), "{}", event.message()),
        }
    }
}

/// Publishes to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    #[must_use]
    pub fn with(mut self, sink: std::sync::Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn publish(&self, event: &SyncEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn pass_summary_messages() {
        let event = |succeeded, failed| SyncEvent::PassCompleted {
            succeeded,
            retried: 0,
            failed,
        };
        assert_eq!(event(1, 0).message(), "Synced 1 change");
        assert_eq!(event(3, 0).message(), "Synced 3 changes");
        assert_eq!(event(3, 1).message(), "Synced 3 changes, 1 failed");
    }

    #[test]
    fn failure_message_carries_summary() {
        let event = SyncEvent::PermanentlyFailed {
            id: OperationId::new(),
            kind: OperationKind::WaiverClaim,
            summary: "waiver claim (league-1)".to_string(),
            reason: "HTTP 422".to_string(),
        };
        assert_eq!(event.name(), "permanently-failed");
        assert_eq!(
            event.message(),
            "Failed to sync waiver claim (league-1): HTTP 422"
        );
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = SyncEvent::PassCompleted {
            succeeded: 2,
            retried: 1,
            failed: 0,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "pass-completed");
        assert_eq!(value["succeeded"], 2);
    }

    #[test]
    fn broadcast_sink_delivers_to_subscribers() {
        let sink = BroadcastSink::default();
        let mut rx = sink.subscribe();
        sink.publish(&SyncEvent::PassCompleted {
            succeeded: 0,
            retried: 0,
            failed: 0,
        });
        assert_eq!(rx.try_recv().unwrap().name(), "pass-completed");
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(BroadcastSink::default());
        let second = Arc::new(BroadcastSink::default());
        let mut rx1 = first.subscribe();
        let mut rx2 = second.subscribe();

        let fanout = FanoutSink::default()
            .with(first.clone())
            .with(second.clone())
            .with(Arc::new(TracingSink));
        fanout.publish(&SyncEvent::Synced {
            id: OperationId::new(),
            kind: OperationKind::DraftPick,
        });

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }
}
