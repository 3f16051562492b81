//! # Event Fan-out
//!
//! The `EventHub` is the listener registry of an engine. Every listener gets
//! its own unbounded MPSC channel, so emitting never blocks the engine: a
//! send either lands in the listener's queue immediately or fails because the
//! receiver was dropped, in which case the listener is pruned.

use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::errors::ConsolidatorError;

/// Events observable by subscribers of a consolidation engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ConsolidatorEvent {
    /// A slice of a polled response addressed to one subscriber.
    Data {
        /// The subscribed path this data belongs to.
        origin: String,
        /// The polled path the data was extracted from, when it differs from `origin`.
        #[serde(skip_serializing_if = "Option::is_none")]
        source: Option<String>,
        /// The extracted value.
        data: Value,
    },
    /// A fetch-level failure for one poll target.
    Error {
        /// The polled path whose cycle failed.
        #[serde(skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        /// What went wrong.
        #[serde(serialize_with = "serialize_cause")]
        cause: ConsolidatorError,
    },
}

fn serialize_cause<S: serde::Serializer>(cause: &ConsolidatorError, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&cause.to_string())
}

impl ConsolidatorEvent {
    /// The path the event is addressed to, if any.
    pub fn origin(&self) -> Option<&str> {
        match self {
            ConsolidatorEvent::Data { origin, .. } => Some(origin),
            ConsolidatorEvent::Error { origin, .. } => origin.as_deref(),
        }
    }
}

/// Registry of event listeners.
#[derive(Default)]
pub struct EventHub {
    listeners: Mutex<Vec<mpsc::UnboundedSender<ConsolidatorEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new listener and returns the receiving half of its channel.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ConsolidatorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.push(tx);
        log::debug!("Listener registered ({} total)", listeners.len());
        rx
    }

    /// Number of listeners still connected as of the last emission.
    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Delivers `event` to every listener, dropping the ones that went away.
    pub fn emit(&self, event: ConsolidatorEvent) {
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.retain(|tx| match tx.send(event.clone()) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Listener disconnected. Removing from hub.");
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_emit_reaches_every_listener() {
        let hub = EventHub::new();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();

        hub.emit(ConsolidatorEvent::Data { origin: "/a".into(), source: None, data: json!(1) });

        assert_eq!(first.try_recv().unwrap().origin(), Some("/a"));
        assert_eq!(second.try_recv().unwrap().origin(), Some("/a"));
    }

    #[test]
    fn test_dropped_listener_is_pruned() {
        let hub = EventHub::new();
        let keep = hub.subscribe();
        drop(hub.subscribe());
        assert_eq!(hub.listener_count(), 2);

        hub.emit(ConsolidatorEvent::Error {
            origin: None,
            cause: ConsolidatorError::Transport("down".into()),
        });
        assert_eq!(hub.listener_count(), 1);
        drop(keep);
    }

    #[test]
    fn test_event_serializes_as_tagged_json() {
        let event = ConsolidatorEvent::Data {
            origin: "/a/b/x".into(),
            source: Some("/a/b".into()),
            data: json!("v1"),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"event": "data", "origin": "/a/b/x", "source": "/a/b", "data": "v1"})
        );

        let error = ConsolidatorEvent::Error {
            origin: Some("/a".into()),
            cause: ConsolidatorError::MalformedBody("eof".into()),
        };
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({"event": "error", "origin": "/a", "cause": "Malformed response body: eof"})
        );
    }
}
