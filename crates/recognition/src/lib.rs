//! Continuous recognition session and the engine boundary it drives.

mod engine;
mod null;
mod push_stream;
mod session;

pub use engine::{EventSink, RecognizerError, RecognizerSettings, TranslationRecognizer};
pub use null::NullRecognizer;
pub use push_stream::{push_stream, push_stream_with_capacity, PushAudioReader, PushAudioStream};
pub use session::{RecognitionSession, SessionState};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("recognition session already running")]
    AlreadyRunning,
    #[error("failed to start recognition: {0}")]
    StartFailed(#[source] RecognizerError),
    #[error("failed to stop recognition: {0}")]
    StopFailed(#[source] RecognizerError),
}

pub type Result<T> = std::result::Result<T, SessionError>;
