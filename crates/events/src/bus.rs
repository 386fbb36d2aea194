//! Event bus abstraction for decoupled notification delivery.
//!
//! The pipeline emits topic + JSON payload pairs; what happens to them
//! (console, capture for tests, nothing) is up to the bus.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::event_names;

/// Trait for emitting events to subscribers.
pub trait EventBus: Send + Sync {
    /// Emit an event with a JSON payload.
    ///
    /// # Arguments
    /// * `topic` - Event name/topic (e.g., "translation:final")
    /// * `payload` - JSON payload to emit
    fn emit(&self, topic: &str, payload: serde_json::Value);
}

/// Type alias for shared event bus reference.
pub type EventBusRef = Arc<dyn EventBus>;

/// In-memory event bus for testing.
///
/// Captures all emitted events for later inspection.
#[derive(Default)]
pub struct InMemoryEventBus {
    events: Mutex<Vec<EmittedEvent>>,
}

/// A captured event from InMemoryEventBus.
#[derive(Debug, Clone)]
pub struct EmittedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EmittedEvent>> {
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Get all captured events.
    pub fn events(&self) -> Vec<EmittedEvent> {
        self.lock().clone()
    }

    /// Get events for a specific topic.
    pub fn events_for(&self, topic: &str) -> Vec<EmittedEvent> {
        self.lock()
            .iter()
            .filter(|e| e.topic == topic)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl EventBus for InMemoryEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        self.lock().push(EmittedEvent {
            topic: topic.to_string(),
            payload,
        });
    }
}

/// Writes one human-readable line per notification.
pub struct ConsoleEventBus {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleEventBus {
    /// Console bus writing to stdout.
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Lines printed for a notification. Unknown topics render as `topic: payload`.
    pub fn render(topic: &str, payload: &serde_json::Value) -> Vec<String> {
        let field = |name: &str| -> String {
            match payload.get(name) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => "n/a".to_string(),
                Some(other) => other.to_string(),
            }
        };

        match topic {
            event_names::SESSION_STARTED => vec!["Session Started".to_string()],
            event_names::SESSION_STOPPED => vec!["Session Stopped".to_string()],
            event_names::TRANSLATION_INTERIM => {
                vec![format!("Translating [{}]: {}", field("language"), field("text"))]
            }
            event_names::TRANSLATION_FINAL => {
                vec![format!("TRANSLATED [{}]: {}", field("language"), field("text"))]
            }
            event_names::RECOGNITION_NO_MATCH => vec![format!("NOMATCH: Reason={}", field("reason"))],
            event_names::SESSION_CANCELED => {
                let reason = field("reason");
                let mut lines = vec![format!("CANCELED: Reason={reason}")];
                if reason == "Error" {
                    lines.push(format!("CANCELED: ErrorCode={}", field("error_code")));
                    lines.push(format!("CANCELED: ErrorDetails={}", field("error_details")));
                }
                lines
            }
            event_names::PUBLISH_FAILED => vec![format!("PUBLISH FAILED: {}", field("error"))],
            other => vec![format!("{other}: {payload}")],
        }
    }
}

impl EventBus for ConsoleEventBus {
    fn emit(&self, topic: &str, payload: serde_json::Value) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        for line in Self::render(topic, &payload) {
            if let Err(e) = writeln!(out, "{line}") {
                tracing::warn!(error = %e, "Failed to write notification");
                return;
            }
        }
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_in_memory_event_bus() {
        let bus = InMemoryEventBus::new();

        bus.emit("test:event1", json!({"key": "value1"}));
        bus.emit("test:event2", json!({"key": "value2"}));
        bus.emit("test:event1", json!({"key": "value3"}));

        assert_eq!(bus.len(), 3);
        assert_eq!(bus.events_for("test:event1").len(), 2);
        assert_eq!(bus.events_for("test:event2").len(), 1);
        assert_eq!(bus.events_for("test:missing").len(), 0);

        bus.clear();
        assert!(bus.is_empty());
    }

    #[test]
    fn test_render_translations() {
        let payload = json!({"language": "uk", "text": "Привіт", "ts_ms": 1});
        assert_eq!(
            ConsoleEventBus::render(event_names::TRANSLATION_INTERIM, &payload),
            vec!["Translating [uk]: Привіт"]
        );
        assert_eq!(
            ConsoleEventBus::render(event_names::TRANSLATION_FINAL, &payload),
            vec!["TRANSLATED [uk]: Привіт"]
        );
    }

    #[test]
    fn test_render_cancellation() {
        let error = json!({"reason": "Error", "error_code": 1, "error_details": "device lost"});
        assert_eq!(
            ConsoleEventBus::render(event_names::SESSION_CANCELED, &error),
            vec![
                "CANCELED: Reason=Error",
                "CANCELED: ErrorCode=1",
                "CANCELED: ErrorDetails=device lost",
            ]
        );

        let eos = json!({"reason": "EndOfStream", "error_code": null});
        assert_eq!(
            ConsoleEventBus::render(event_names::SESSION_CANCELED, &eos),
            vec!["CANCELED: Reason=EndOfStream"]
        );
    }

    #[test]
    fn test_console_bus_writes_lines() {
        #[derive(Clone, Default)]
        struct SharedBuf(Arc<Mutex<Vec<u8>>>);

        impl Write for SharedBuf {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buf = SharedBuf::default();
        let bus = ConsoleEventBus::with_writer(Box::new(buf.clone()));

        bus.emit(event_names::SESSION_STARTED, json!({"session_id": "abc"}));
        bus.emit(event_names::RECOGNITION_NO_MATCH, json!({"reason": "InitialSilenceTimeout"}));

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            written,
            "Session Started\nNOMATCH: Reason=InitialSilenceTimeout\n"
        );
    }
}
