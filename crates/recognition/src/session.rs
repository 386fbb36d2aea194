//! Recognition session state machine.
//!
//! The session owns the engine and the handlers the application registers.
//! Engine events are handled synchronously, one at a time, under a single
//! lock, so handlers observe them strictly in emission order.

use std::sync::{Arc, Mutex, MutexGuard};

use cpc_events::{
    CancellationDetails, CancellationReason, NoMatchReason, RecognitionEvent, ResultReason,
    TranslationResult,
};

use crate::engine::{EventSink, EventTarget, TranslationRecognizer};
use crate::{Result, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Started,
    Recognizing,
    Stopped,
}

impl SessionState {
    pub fn is_active(self) -> bool {
        matches!(self, SessionState::Started | SessionState::Recognizing)
    }
}

type SessionHandler = Box<dyn Fn(&str) + Send>;
type TranslationHandler = Box<dyn Fn(&str, &str) + Send>;
type NoMatchHandler = Box<dyn Fn(NoMatchReason) + Send>;
type CanceledHandler = Box<dyn Fn(&CancellationDetails) + Send>;

#[derive(Default)]
struct Handlers {
    session_started: Vec<SessionHandler>,
    session_stopped: Vec<SessionHandler>,
    recognizing: Vec<TranslationHandler>,
    recognized: Vec<TranslationHandler>,
    no_match: Vec<NoMatchHandler>,
    canceled: Vec<CanceledHandler>,
}

struct SessionCore {
    state: SessionState,
    session_id: Option<String>,
    cancellation: Option<CancellationDetails>,
    handlers: Handlers,
}

struct SharedCore(Mutex<SessionCore>);

impl SharedCore {
    fn lock(&self) -> MutexGuard<'_, SessionCore> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventTarget for SharedCore {
    fn handle(&self, event: RecognitionEvent) {
        self.lock().handle(event);
    }
}

impl SessionCore {
    fn handle(&mut self, event: RecognitionEvent) {
        if !self.state.is_active() {
            tracing::debug!(state = ?self.state, ?event, "Ignoring event for inactive session");
            return;
        }

        match event {
            RecognitionEvent::SessionStarted { session_id } => {
                tracing::info!(%session_id, "Recognition session started");
                for handler in &self.handlers.session_started {
                    handler(&session_id);
                }
                self.session_id = Some(session_id);
            }
            RecognitionEvent::SessionStopped { session_id } => {
                tracing::info!(%session_id, "Recognition session stopped");
                self.state = SessionState::Stopped;
                for handler in &self.handlers.session_stopped {
                    handler(&session_id);
                }
            }
            RecognitionEvent::Recognizing(result) => self.on_recognizing(result),
            RecognitionEvent::Recognized(result) => self.on_recognized(result),
            RecognitionEvent::Canceled(details) => {
                self.state = SessionState::Stopped;
                match details.reason {
                    CancellationReason::Error => tracing::error!(
                        error_code = ?details.error_code,
                        error_details = ?details.error_details,
                        "Recognition canceled"
                    ),
                    reason => tracing::warn!(?reason, "Recognition canceled"),
                }
                for handler in &self.handlers.canceled {
                    handler(&details);
                }
                self.cancellation = Some(details);
            }
        }
    }

    fn on_recognizing(&mut self, result: TranslationResult) {
        if result.reason != ResultReason::TranslatingSpeech {
            tracing::debug!(reason = ?result.reason, "Ignoring interim result");
            return;
        }
        self.state = SessionState::Recognizing;
        for (language, text) in &result.translations {
            for handler in &self.handlers.recognizing {
                handler(language, text);
            }
        }
    }

    fn on_recognized(&mut self, result: TranslationResult) {
        self.state = SessionState::Started;
        match result.reason {
            ResultReason::TranslatedSpeech => {
                for (language, text) in &result.translations {
                    tracing::debug!(%language, chars = text.chars().count(), "Translation final");
                    for handler in &self.handlers.recognized {
                        handler(language, text);
                    }
                }
            }
            ResultReason::NoMatch => {
                let reason = result.no_match_reason.unwrap_or(NoMatchReason::NotRecognized);
                tracing::debug!(?reason, "No speech recognized");
                for handler in &self.handlers.no_match {
                    handler(reason);
                }
            }
            other => tracing::debug!(reason = ?other, "Ignoring final result"),
        }
    }
}

/// A continuous recognition run against one engine.
///
/// Handlers must not call back into the session: they run while the session
/// lock is held.
pub struct RecognitionSession {
    engine: Mutex<Box<dyn TranslationRecognizer>>,
    core: Arc<SharedCore>,
}

impl RecognitionSession {
    pub fn new(engine: Box<dyn TranslationRecognizer>) -> Self {
        Self {
            engine: Mutex::new(engine),
            core: Arc::new(SharedCore(Mutex::new(SessionCore {
                state: SessionState::Idle,
                session_id: None,
                cancellation: None,
                handlers: Handlers::default(),
            }))),
        }
    }

    pub fn on_session_started(&self, handler: impl Fn(&str) + Send + 'static) {
        self.core.lock().handlers.session_started.push(Box::new(handler));
    }

    pub fn on_session_stopped(&self, handler: impl Fn(&str) + Send + 'static) {
        self.core.lock().handlers.session_stopped.push(Box::new(handler));
    }

    /// Interim translation, called once per (language, text) pair.
    pub fn on_recognizing(&self, handler: impl Fn(&str, &str) + Send + 'static) {
        self.core.lock().handlers.recognizing.push(Box::new(handler));
    }

    /// Final translation, called once per (language, text) pair.
    pub fn on_recognized(&self, handler: impl Fn(&str, &str) + Send + 'static) {
        self.core.lock().handlers.recognized.push(Box::new(handler));
    }

    pub fn on_no_match(&self, handler: impl Fn(NoMatchReason) + Send + 'static) {
        self.core.lock().handlers.no_match.push(Box::new(handler));
    }

    pub fn on_canceled(&self, handler: impl Fn(&CancellationDetails) + Send + 'static) {
        self.core.lock().handlers.canceled.push(Box::new(handler));
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    /// Engine-assigned id of the latest session, once `SessionStarted` arrived.
    pub fn session_id(&self) -> Option<String> {
        self.core.lock().session_id.clone()
    }

    /// Cancellation that ended the current run, if any.
    pub fn cancellation(&self) -> Option<CancellationDetails> {
        self.core.lock().cancellation.clone()
    }

    pub fn engine_name(&self) -> String {
        self.engine().name().to_string()
    }

    /// Begin continuous recognition.
    pub fn start(&self) -> Result<()> {
        {
            let mut core = self.core.lock();
            if core.state.is_active() {
                return Err(SessionError::AlreadyRunning);
            }
            core.state = SessionState::Started;
            core.cancellation = None;
        }

        let target: Arc<dyn EventTarget> = self.core.clone();
        let sink = EventSink::new(Arc::downgrade(&target));

        let mut engine = self.engine();
        tracing::info!(engine = engine.name(), "Starting continuous recognition");
        if let Err(e) = engine.start_continuous(sink) {
            tracing::error!(error = %e, "Failed to start continuous recognition");
            if let Err(stop_err) = engine.stop_continuous() {
                tracing::warn!(error = %stop_err, "Cleanup after failed start also failed");
            }
            drop(engine);
            self.core.lock().state = SessionState::Idle;
            return Err(SessionError::StartFailed(e));
        }
        Ok(())
    }

    /// Stop continuous recognition. No-op for a session that never started.
    pub fn stop(&self) -> Result<()> {
        if self.core.lock().state == SessionState::Idle {
            return Ok(());
        }

        // The engine may deliver events while draining; the core lock must be free.
        let result = self.engine().stop_continuous();
        self.core.lock().state = SessionState::Stopped;

        result.map_err(|e| {
            tracing::error!(error = %e, "Failed to stop continuous recognition");
            SessionError::StopFailed(e)
        })
    }

    fn engine(&self) -> MutexGuard<'_, Box<dyn TranslationRecognizer>> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for RecognitionSession {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "Error stopping recognition on drop");
        }
        self.core.lock().handlers = Handlers::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecognizerError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct EngineProbe {
        sink: Mutex<Option<EventSink>>,
        starts: AtomicUsize,
        stops: AtomicUsize,
    }

    impl EngineProbe {
        fn deliver(&self, event: RecognitionEvent) {
            let sink = self.sink.lock().unwrap().clone().expect("engine not started");
            sink.deliver(event);
        }
    }

    struct ScriptedEngine {
        probe: Arc<EngineProbe>,
        fail_start: bool,
        on_stop: Vec<RecognitionEvent>,
    }

    impl ScriptedEngine {
        fn new(probe: &Arc<EngineProbe>) -> Self {
            Self {
                probe: Arc::clone(probe),
                fail_start: false,
                on_stop: Vec::new(),
            }
        }
    }

    impl TranslationRecognizer for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start_continuous(&mut self, events: EventSink) -> std::result::Result<(), RecognizerError> {
            self.probe.starts.fetch_add(1, Ordering::SeqCst);
            if self.fail_start {
                return Err(RecognizerError::Engine("no network".into()));
            }
            *self.probe.sink.lock().unwrap() = Some(events);
            Ok(())
        }

        fn stop_continuous(&mut self) -> std::result::Result<(), RecognizerError> {
            self.probe.stops.fetch_add(1, Ordering::SeqCst);
            let sink = self.probe.sink.lock().unwrap().clone();
            if let Some(sink) = sink {
                for event in self.on_stop.drain(..) {
                    sink.deliver(event);
                }
            }
            Ok(())
        }
    }

    fn recorded_session(engine: ScriptedEngine) -> (RecognitionSession, Arc<Mutex<Vec<String>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let session = RecognitionSession::new(Box::new(engine));

        let l = Arc::clone(&log);
        session.on_recognizing(move |lang, text| l.lock().unwrap().push(format!("interim {lang} {text}")));
        let l = Arc::clone(&log);
        session.on_recognized(move |lang, text| l.lock().unwrap().push(format!("final {lang} {text}")));
        let l = Arc::clone(&log);
        session.on_no_match(move |reason| l.lock().unwrap().push(format!("nomatch {reason:?}")));
        let l = Arc::clone(&log);
        session.on_canceled(move |d| {
            l.lock()
                .unwrap()
                .push(format!("canceled {:?} {:?}", d.reason, d.error_code))
        });
        let l = Arc::clone(&log);
        session.on_session_stopped(move |id| l.lock().unwrap().push(format!("stopped {id}")));

        (session, log)
    }

    fn uk(text: &str) -> [(String, String); 1] {
        [("uk".to_string(), text.to_string())]
    }

    #[test]
    fn test_final_translation_reaches_handler_once() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));

        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Started);

        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Привіт"))));

        assert_eq!(*log.lock().unwrap(), vec!["final uk Привіт"]);
        assert_eq!(session.state(), SessionState::Started);
    }

    #[test]
    fn test_interim_moves_to_recognizing_and_back() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        probe.deliver(RecognitionEvent::Recognizing(TranslationResult::translating(uk("При"))));
        assert_eq!(session.state(), SessionState::Recognizing);

        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Привіт"))));
        assert_eq!(session.state(), SessionState::Started);
        assert_eq!(*log.lock().unwrap(), vec!["interim uk При", "final uk Привіт"]);
    }

    #[test]
    fn test_one_callback_per_target_language() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated([
            ("de".to_string(), "Hallo".to_string()),
            ("uk".to_string(), "Привіт".to_string()),
        ])));

        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_no_match_reports_reason() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        probe.deliver(RecognitionEvent::Recognized(TranslationResult::no_match(
            NoMatchReason::InitialSilenceTimeout,
        )));

        assert_eq!(*log.lock().unwrap(), vec!["nomatch InitialSilenceTimeout"]);
    }

    #[test]
    fn test_cancel_while_recognizing_stops_session() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        probe.deliver(RecognitionEvent::Recognizing(TranslationResult::translating(uk("При"))));
        probe.deliver(RecognitionEvent::Canceled(CancellationDetails::error(1, "device lost")));

        assert_eq!(session.state(), SessionState::Stopped);
        let cancellation = session.cancellation().unwrap();
        assert_eq!(cancellation.error_code, Some(1));
        assert_eq!(cancellation.error_details.as_deref(), Some("device lost"));

        // Nothing is handled after cancellation.
        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Привіт"))));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["interim uk При", "canceled Error Some(1)"]
        );
    }

    #[test]
    fn test_restart_after_cancel() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();
        probe.deliver(RecognitionEvent::Canceled(CancellationDetails::error(2, "timeout")));

        session.start().unwrap();
        assert!(session.cancellation().is_none());
        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Так"))));

        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("final uk Так"));
        assert_eq!(probe.starts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let probe = Arc::new(EngineProbe::default());
        let (session, _log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        assert!(matches!(session.start(), Err(SessionError::AlreadyRunning)));
        assert_eq!(probe.starts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_start_returns_to_idle() {
        let probe = Arc::new(EngineProbe::default());
        let mut engine = ScriptedEngine::new(&probe);
        engine.fail_start = true;
        let (session, _log) = recorded_session(engine);

        let err = session.start().unwrap_err();
        assert!(matches!(err, SessionError::StartFailed(_)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let probe = Arc::new(EngineProbe::default());
        let (session, _log) = recorded_session(ScriptedEngine::new(&probe));

        session.stop().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(probe.stops.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_events_during_stop_drain_are_handled() {
        let probe = Arc::new(EngineProbe::default());
        let mut engine = ScriptedEngine::new(&probe);
        engine.on_stop = vec![
            RecognitionEvent::Recognized(TranslationResult::translated(uk("Бувай"))),
            RecognitionEvent::SessionStopped {
                session_id: "s1".into(),
            },
        ];
        let (session, log) = recorded_session(engine);
        session.start().unwrap();

        session.stop().unwrap();

        assert_eq!(session.state(), SessionState::Stopped);
        assert_eq!(*log.lock().unwrap(), vec!["final uk Бувай", "stopped s1"]);
    }

    #[test]
    fn test_events_after_stop_are_ignored() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();
        session.stop().unwrap();

        probe.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Привіт"))));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_drop_detaches_sink() {
        let probe = Arc::new(EngineProbe::default());
        let (session, log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();
        drop(session);

        let sink = probe.sink.lock().unwrap().clone().unwrap();
        assert!(!sink.is_attached());
        sink.deliver(RecognitionEvent::Recognized(TranslationResult::translated(uk("Привіт"))));
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(probe.stops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_session_started_records_id() {
        let probe = Arc::new(EngineProbe::default());
        let (session, _log) = recorded_session(ScriptedEngine::new(&probe));
        session.start().unwrap();

        probe.deliver(RecognitionEvent::SessionStarted {
            session_id: "abc".into(),
        });
        assert_eq!(session.session_id().as_deref(), Some("abc"));
        assert_eq!(session.state(), SessionState::Started);
    }
}
