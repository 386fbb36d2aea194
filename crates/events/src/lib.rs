//! Recognition event model and notification contracts.
//!
//! `RecognitionEvent` is what a translation engine emits. The notification
//! payloads are what the pipeline publishes on an [`EventBus`] for display
//! and logging.

mod bus;

pub use bus::{ConsoleEventBus, EmittedEvent, EventBus, EventBusRef, InMemoryEventBus};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why the engine produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultReason {
    RecognizingSpeech,
    RecognizedSpeech,
    TranslatingSpeech,
    TranslatedSpeech,
    NoMatch,
}

/// Why nothing was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoMatchReason {
    NotRecognized,
    InitialSilenceTimeout,
    InitialBabbleTimeout,
    KeywordNotRecognized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancellationReason {
    Error,
    EndOfStream,
    CancelledByUser,
}

/// Interim or final translation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationResult {
    pub reason: ResultReason,
    /// Recognized text in the source language.
    #[serde(default)]
    pub text: String,
    /// Target language code to translated text.
    #[serde(default)]
    pub translations: BTreeMap<String, String>,
    #[serde(default)]
    pub no_match_reason: Option<NoMatchReason>,
}

impl TranslationResult {
    pub fn translating(translations: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            reason: ResultReason::TranslatingSpeech,
            text: String::new(),
            translations: translations.into_iter().collect(),
            no_match_reason: None,
        }
    }

    pub fn translated(translations: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            reason: ResultReason::TranslatedSpeech,
            ..Self::translating(translations)
        }
    }

    pub fn no_match(reason: NoMatchReason) -> Self {
        Self {
            reason: ResultReason::NoMatch,
            text: String::new(),
            translations: BTreeMap::new(),
            no_match_reason: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationDetails {
    pub reason: CancellationReason,
    #[serde(default)]
    pub error_code: Option<i32>,
    #[serde(default)]
    pub error_details: Option<String>,
}

impl CancellationDetails {
    pub fn error(code: i32, details: impl Into<String>) -> Self {
        Self {
            reason: CancellationReason::Error,
            error_code: Some(code),
            error_details: Some(details.into()),
        }
    }
}

/// Event raised by a translation engine during continuous recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RecognitionEvent {
    SessionStarted { session_id: String },
    SessionStopped { session_id: String },
    /// Interim result, superseded by later events for the same utterance.
    Recognizing(TranslationResult),
    /// Final result or no-match for an utterance.
    Recognized(TranslationResult),
    Canceled(CancellationDetails),
}

/// Payload for session lifecycle notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session_id: String,
    pub ts_ms: i64,
}

/// Payload for interim and final translation notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationPayload {
    pub language: String,
    pub text: String,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoMatchPayload {
    pub reason: NoMatchReason,
    pub ts_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanceledPayload {
    pub reason: CancellationReason,
    #[serde(default)]
    pub error_code: Option<i32>,
    #[serde(default)]
    pub error_details: Option<String>,
    pub ts_ms: i64,
}

/// Payload for publish failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishFailedPayload {
    pub text: String,
    pub error: String,
    pub ts_ms: i64,
}

/// Event names as constants to prevent typos.
pub mod event_names {
    pub const SESSION_STARTED: &str = "session:started";
    pub const SESSION_STOPPED: &str = "session:stopped";
    pub const TRANSLATION_INTERIM: &str = "translation:interim";
    pub const TRANSLATION_FINAL: &str = "translation:final";
    pub const RECOGNITION_NO_MATCH: &str = "recognition:no_match";
    pub const SESSION_CANCELED: &str = "session:canceled";
    pub const PUBLISH_FAILED: &str = "publish:failed";
}
