use std::sync::Arc;

use cpc_audio::{AudioCapture, CaptureError};
use cpc_bus::{now_ms, PipelineStatus, PipelineStatusSnapshot};
use cpc_events::{
    event_names, CanceledPayload, EventBusRef, NoMatchPayload, SessionPayload, TranslationPayload,
};
use cpc_publisher::TranslationPublisher;
use cpc_recognition::{RecognitionSession, SessionError, SessionState};

use crate::publishing::{emit, PublishHandle, PublishingQueue};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("audio capture failed to start: {0}")]
    Capture(#[from] CaptureError),
    #[error("recognition failed to start: {0}")]
    Session(#[from] SessionError),
}

/// Capture, recognition and publishing wired together.
///
/// Interim translations are only notified. Final translations are notified
/// and queued for publishing.
pub struct TranslationPipeline {
    capture: Box<dyn AudioCapture>,
    session: RecognitionSession,
    queue: PublishingQueue,
    status: Option<Arc<PipelineStatus>>,
}

impl TranslationPipeline {
    /// Must be called within a tokio runtime.
    pub fn new(
        capture: Box<dyn AudioCapture>,
        session: RecognitionSession,
        publisher: Arc<dyn TranslationPublisher>,
        events: EventBusRef,
    ) -> Self {
        let queue = PublishingQueue::spawn(publisher, events.clone());
        register_handlers(&session, queue.handle(), events);

        Self {
            capture,
            session,
            queue,
            status: None,
        }
    }

    /// Attach capture metrics, logged at shutdown.
    pub fn with_status(mut self, status: Arc<PipelineStatus>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn start(&mut self) -> Result<(), PipelineError> {
        self.capture.start()?;

        if let Err(e) = self.session.start() {
            tracing::error!(error = %e, "Recognition failed to start, stopping capture");
            self.capture.stop();
            return Err(e.into());
        }

        tracing::info!(engine = %self.session.engine_name(), "Translation pipeline started");
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Err(e) = self.session.stop() {
            tracing::error!(error = %e, "Error stopping recognition");
        }
        self.capture.stop();
    }

    /// Stop, then wait for queued publishes to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        let Self { queue, status, .. } = self;
        queue.shutdown().await;

        if let Some(status) = status {
            let snapshot = status.snapshot();
            tracing::info!(
                frames_captured = snapshot.frames_captured,
                frames_dropped = snapshot.frames_dropped,
                frames_converted = snapshot.frames_converted,
                conversion_failures = snapshot.conversion_failures,
                bytes_streamed = snapshot.bytes_streamed,
                "Translation pipeline shut down"
            );
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.is_running()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn status(&self) -> Option<PipelineStatusSnapshot> {
        self.status.as_ref().map(|s| s.snapshot())
    }

    pub fn publish_handle(&self) -> PublishHandle {
        self.queue.handle()
    }
}

fn register_handlers(session: &RecognitionSession, publish: PublishHandle, events: EventBusRef) {
    let ev = events.clone();
    session.on_session_started(move |session_id| {
        emit(
            &ev,
            event_names::SESSION_STARTED,
            &SessionPayload {
                session_id: session_id.to_string(),
                ts_ms: now_ms(),
            },
        );
    });

    let ev = events.clone();
    session.on_session_stopped(move |session_id| {
        emit(
            &ev,
            event_names::SESSION_STOPPED,
            &SessionPayload {
                session_id: session_id.to_string(),
                ts_ms: now_ms(),
            },
        );
    });

    let ev = events.clone();
    session.on_recognizing(move |language, text| {
        emit(&ev, event_names::TRANSLATION_INTERIM, &translation(language, text));
    });

    let ev = events.clone();
    session.on_recognized(move |language, text| {
        emit(&ev, event_names::TRANSLATION_FINAL, &translation(language, text));
        publish.enqueue(text);
    });

    let ev = events.clone();
    session.on_no_match(move |reason| {
        emit(
            &ev,
            event_names::RECOGNITION_NO_MATCH,
            &NoMatchPayload {
                reason,
                ts_ms: now_ms(),
            },
        );
    });

    session.on_canceled(move |details| {
        emit(
            &events,
            event_names::SESSION_CANCELED,
            &CanceledPayload {
                reason: details.reason,
                error_code: details.error_code,
                error_details: details.error_details.clone(),
                ts_ms: now_ms(),
            },
        );
    });
}

fn translation(language: &str, text: &str) -> TranslationPayload {
    TranslationPayload {
        language: language.to_string(),
        text: text.to_string(),
        ts_ms: now_ms(),
    }
}
