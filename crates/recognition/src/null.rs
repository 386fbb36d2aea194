//! Dry-run recognizer.
//!
//! Consumes the pushed audio and reports session lifecycle only. Used when no
//! translation engine is linked in, so the capture path can be exercised end
//! to end.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use tokio_util::sync::CancellationToken;

use cpc_events::{CancellationDetails, CancellationReason, RecognitionEvent};

use crate::engine::{EventSink, RecognizerError, RecognizerSettings, TranslationRecognizer};
use crate::push_stream::PushAudioReader;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<PushAudioReader>,
}

pub struct NullRecognizer {
    settings: RecognizerSettings,
    reader: Option<PushAudioReader>,
    running: Option<Running>,
}

impl NullRecognizer {
    pub fn new(settings: RecognizerSettings, reader: PushAudioReader) -> Self {
        Self {
            settings,
            reader: Some(reader),
            running: None,
        }
    }

    pub fn settings(&self) -> &RecognizerSettings {
        &self.settings
    }
}

impl TranslationRecognizer for NullRecognizer {
    fn name(&self) -> &str {
        "null"
    }

    fn start_continuous(&mut self, events: EventSink) -> Result<(), RecognizerError> {
        if self.running.is_some() {
            return Err(RecognizerError::AlreadyStarted);
        }
        let reader = self.reader.take().ok_or(RecognizerError::StreamUnavailable)?;

        tracing::info!(
            language = %self.settings.recognition_language,
            targets = ?self.settings.target_languages,
            "Dry-run recognizer started, audio is consumed but not recognized"
        );

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = thread::Builder::new()
            .name("cpc-null-recognizer".into())
            .spawn(move || drain_audio(reader, events, token))
            .map_err(|e| RecognizerError::Engine(format!("failed to spawn recognizer thread: {e}")))?;

        self.running = Some(Running { cancel, handle });
        Ok(())
    }

    fn stop_continuous(&mut self) -> Result<(), RecognizerError> {
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        running.cancel.cancel();
        match running.handle.join() {
            Ok(reader) => {
                self.reader = Some(reader);
                Ok(())
            }
            Err(_) => Err(RecognizerError::Engine("recognizer thread panicked".into())),
        }
    }
}

impl Drop for NullRecognizer {
    fn drop(&mut self) {
        let _ = self.stop_continuous();
    }
}

fn drain_audio(
    mut reader: PushAudioReader,
    events: EventSink,
    cancel: CancellationToken,
) -> PushAudioReader {
    let session_id = uuid::Uuid::new_v4().simple().to_string();
    events.deliver(RecognitionEvent::SessionStarted {
        session_id: session_id.clone(),
    });

    while !cancel.is_cancelled() {
        match reader.recv_timeout(POLL_INTERVAL) {
            Ok(_) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::info!("Audio stream closed");
                events.deliver(RecognitionEvent::Canceled(CancellationDetails {
                    reason: CancellationReason::EndOfStream,
                    error_code: None,
                    error_details: None,
                }));
                break;
            }
        }
    }

    tracing::debug!(bytes = reader.bytes_received(), "Dry-run recognizer consumed audio");
    events.deliver(RecognitionEvent::SessionStopped { session_id });
    reader
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{push_stream, RecognitionSession, SessionState};
    use cpc_audio::StreamingSink;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_session_lifecycle_with_null_recognizer() {
        let (writer, reader) = push_stream();
        let session = RecognitionSession::new(Box::new(NullRecognizer::new(
            RecognizerSettings::default(),
            reader,
        )));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        session.on_session_started(move |_| s.lock().unwrap().push("started"));
        let s = Arc::clone(&seen);
        session.on_session_stopped(move |_| s.lock().unwrap().push("stopped"));

        session.start().unwrap();
        writer.write(vec![0; 320]);
        session.stop().unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(*seen.lock().unwrap(), vec!["started", "stopped"]);
        assert!(session.session_id().is_some());
    }

    #[test]
    fn test_restart_reuses_reader() {
        let (writer, reader) = push_stream();
        let session = RecognitionSession::new(Box::new(NullRecognizer::new(
            RecognizerSettings::default(),
            reader,
        )));

        session.start().unwrap();
        session.stop().unwrap();
        session.start().unwrap();
        writer.write(vec![0; 320]);
        session.stop().unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert!(session.cancellation().is_none());
    }

    #[test]
    fn test_writer_drop_cancels_with_end_of_stream() {
        let (writer, reader) = push_stream();
        let session = RecognitionSession::new(Box::new(NullRecognizer::new(
            RecognizerSettings::default(),
            reader,
        )));

        session.start().unwrap();
        drop(writer);

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while session.state() != SessionState::Stopped && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(
            session.cancellation().map(|c| c.reason),
            Some(CancellationReason::EndOfStream)
        );
    }
}
