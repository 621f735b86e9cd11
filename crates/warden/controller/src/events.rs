//! Operational event recording
//!
//! Every failure and every notable decision is published as an event
//! alongside the log line, so operators can follow an object's history
//! without reading controller logs.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};
use uuid::Uuid;
use warden_types::{Kind, ObjectKey};

/// Channel capacity for the event stream
const EVENT_CHANNEL_CAPACITY: usize = 4096;

/// Number of events kept for inspection
const HISTORY_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// An event attached to one object
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: Kind,
    pub key: ObjectKey,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
}

/// Publishes events and keeps a bounded history
#[derive(Debug, Clone)]
pub struct EventRecorder {
    tx: broadcast::Sender<RecordedEvent>,
    history: Arc<RwLock<VecDeque<RecordedEvent>>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRecorder {
    /// Create a new recorder
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            history: Arc::new(RwLock::new(VecDeque::with_capacity(HISTORY_CAPACITY))),
        }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<RecordedEvent> {
        self.tx.subscribe()
    }

    pub async fn record(
        &self,
        kind: Kind,
        key: &ObjectKey,
        event_type: EventType,
        reason: &str,
        message: impl Into<String>,
    ) {
        let event = RecordedEvent {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            key: key.clone(),
            event_type,
            reason: reason.to_string(),
            message: message.into(),
        };

        match event_type {
            EventType::Normal => {
                info!(%kind, object = %key, reason, message = %event.message, "Event")
            }
            EventType::Warning => {
                warn!(%kind, object = %key, reason, message = %event.message, "Event")
            }
        }

        {
            let mut history = self.history.write().await;
            if history.len() == HISTORY_CAPACITY {
                history.pop_front();
            }
            history.push_back(event.clone());
        }
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub async fn normal(&self, kind: Kind, key: &ObjectKey, reason: &str, message: impl Into<String>) {
        self.record(kind, key, EventType::Normal, reason, message).await;
    }

    pub async fn warning(&self, kind: Kind, key: &ObjectKey, reason: &str, message: impl Into<String>) {
        self.record(kind, key, EventType::Warning, reason, message).await;
    }

    /// Events recorded so far, oldest first
    pub async fn history(&self) -> Vec<RecordedEvent> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Recorded events with a given reason
    pub async fn with_reason(&self, reason: &str) -> Vec<RecordedEvent> {
        self.history
            .read()
            .await
            .iter()
            .filter(|e| e.reason == reason)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_and_filter() {
        let recorder = EventRecorder::new();
        let mut rx = recorder.subscribe();
        let key = ObjectKey::new("team", "a");

        recorder
            .warning(Kind::Instance, &key, "McpServerNotFound", "gh missing")
            .await;
        recorder.normal(Kind::Instance, &key, "Reconciled", "ok").await;

        assert_eq!(rx.recv().await.unwrap().reason, "McpServerNotFound");
        assert_eq!(recorder.history().await.len(), 2);
        let warnings = recorder.with_reason("McpServerNotFound").await;
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].event_type, EventType::Warning);
    }
}
