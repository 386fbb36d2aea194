use std::sync::Weak;

use cpc_events::RecognitionEvent;

/// Language setup handed to a translation engine.
#[derive(Clone, PartialEq, Eq)]
pub struct RecognizerSettings {
    pub subscription_key: String,
    pub region: String,
    /// Source language, e.g. "en-US".
    pub recognition_language: String,
    /// Languages to translate into, e.g. ["uk"].
    pub target_languages: Vec<String>,
}

impl std::fmt::Debug for RecognizerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecognizerSettings")
            .field("subscription_key", &"<redacted>")
            .field("region", &self.region)
            .field("recognition_language", &self.recognition_language)
            .field("target_languages", &self.target_languages)
            .finish()
    }
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            subscription_key: String::new(),
            region: String::new(),
            recognition_language: "en-US".to_string(),
            target_languages: vec!["uk".to_string()],
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognizerError {
    #[error("recognizer already started")]
    AlreadyStarted,
    #[error("audio input stream unavailable")]
    StreamUnavailable,
    #[error("engine error: {0}")]
    Engine(String),
}

/// A continuous speech-translation engine.
///
/// The engine reads 16 kHz mono int16 audio from wherever it was configured
/// to (usually a [`PushAudioReader`](crate::PushAudioReader)) and reports
/// through the [`EventSink`] it was started with. Events must be delivered
/// one at a time, in order.
pub trait TranslationRecognizer: Send {
    fn name(&self) -> &str;

    fn start_continuous(&mut self, events: EventSink) -> Result<(), RecognizerError>;

    /// Stop recognition. Events delivered while the engine drains are still
    /// handled by the session. Must be safe to call when not started.
    fn stop_continuous(&mut self) -> Result<(), RecognizerError>;
}

pub(crate) trait EventTarget: Send + Sync {
    fn handle(&self, event: RecognitionEvent);
}

/// Handle an engine uses to report recognition events to its session.
///
/// Once the session is dropped, delivery becomes a no-op.
#[derive(Clone)]
pub struct EventSink {
    target: Weak<dyn EventTarget>,
}

impl EventSink {
    pub(crate) fn new(target: Weak<dyn EventTarget>) -> Self {
        Self { target }
    }

    /// Hand one event to the session. Returns once the event is handled.
    pub fn deliver(&self, event: RecognitionEvent) {
        match self.target.upgrade() {
            Some(target) => target.handle(event),
            None => tracing::debug!(?event, "Recognition session gone, dropping event"),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.target.strong_count() > 0
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_debug_hides_subscription_key() {
        let settings = RecognizerSettings {
            subscription_key: "sk-live-123".to_string(),
            region: "westeurope".to_string(),
            ..Default::default()
        };

        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("sk-live-123"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("westeurope"));
    }
}
