//! Events recorded against a RisingWave object.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::types::ObjectKey;

/// Severity of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => f.write_str("Normal"),
            Self::Warning => f.write_str("Warning"),
        }
    }
}

/// The lifecycle events a RisingWave emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RisingWaveEvent {
    Initializing,
    Running,
    Recovering,
    Upgrading,
    Unhealthy,
}

impl RisingWaveEvent {
    /// The event reason.
    pub fn reason(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Recovering => "Recovering",
            Self::Upgrading => "Upgrading",
            Self::Unhealthy => "Unhealthy",
        }
    }

    /// The event severity.
    pub fn kind(self) -> EventKind {
        match self {
            Self::Initializing | Self::Running | Self::Upgrading => EventKind::Normal,
            Self::Recovering | Self::Unhealthy => EventKind::Warning,
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

/// Sink for events.
pub trait EventRecorder: Send + Sync {
    /// Record an event against the object at `key`.
    fn record(&self, key: &ObjectKey, event: Event);
}

/// Event recorder that keeps every event in memory.
#[derive(Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<(ObjectKey, Event)>>,
}

impl InMemoryEventRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded event, oldest first.
    pub fn events(&self) -> Vec<(ObjectKey, Event)> {
        self.events.lock().clone()
    }

    /// Reasons of the events recorded for `key`, oldest first.
    pub fn reasons(&self, key: &ObjectKey) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, e)| e.reason.clone())
            .collect()
    }
}

impl EventRecorder for InMemoryEventRecorder {
    fn record(&self, key: &ObjectKey, event: Event) {
        self.events.lock().push((key.clone(), event));
    }
}

/// Event recorder that writes events to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn record(&self, key: &ObjectKey, event: Event) {
        match event.kind {
            EventKind::Normal => info!(
                object = %key,
                reason = %event.reason,
                message = %event.message,
                "Event recorded"
            ),
            EventKind::Warning => warn!(
                object = %key,
                reason = %event.reason,
                message = %event.message,
                "Event recorded"
            ),
        }
    }
}

/// Messages attached to events during a single reconcile.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: Mutex<BTreeMap<String, String>>,
}

impl MessageStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message for an event reason.
    pub fn set_message(&self, reason: impl Into<String>, message: impl Into<String>) {
        self.messages.lock().insert(reason.into(), message.into());
    }

    /// Check if a message is set for the reason.
    pub fn is_message_set(&self, reason: &str) -> bool {
        self.messages.lock().contains_key(reason)
    }

    /// The message for the reason, falling back to the reason itself.
    pub fn message_for(&self, reason: &str) -> String {
        self.messages
            .lock()
            .get(reason)
            .cloned()
            .unwrap_or_else(|| reason.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kinds() {
        assert_eq!(RisingWaveEvent::Running.kind(), EventKind::Normal);
        assert_eq!(RisingWaveEvent::Recovering.kind(), EventKind::Warning);
        assert_eq!(RisingWaveEvent::Unhealthy.reason(), "Unhealthy");
    }

    #[test]
    fn test_message_store_fallback() {
        let store = MessageStore::new();
        assert!(!store.is_message_set("Unhealthy"));
        assert_eq!(store.message_for("Unhealthy"), "Unhealthy");

        store.set_message("Unhealthy", "Found components broken or missing: ConfigMap(config)");
        assert!(store.is_message_set("Unhealthy"));
        assert!(store.message_for("Unhealthy").contains("ConfigMap(config)"));
    }

    #[test]
    fn test_in_memory_recorder_filters_by_key() {
        let recorder = InMemoryEventRecorder::new();
        let a = ObjectKey::new("default", "a");
        let b = ObjectKey::new("default", "b");
        let event = |reason: &str| Event {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            message: reason.to_string(),
        };
        recorder.record(&a, event("Initializing"));
        recorder.record(&b, event("Running"));

        assert_eq!(recorder.reasons(&a), vec!["Initializing"]);
        assert_eq!(recorder.events().len(), 2);
    }
}
