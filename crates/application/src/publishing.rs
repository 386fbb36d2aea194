//! Single-worker queue between recognition handlers and the publisher.
//!
//! Handlers run on the engine's callback thread and must not wait on the
//! network, so final translations are queued here and published one at a
//! time, in recognition order. Every final queued is either published or
//! reported on `publish:failed`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cpc_bus::now_ms;
use cpc_events::{event_names, EventBusRef, PublishFailedPayload};
use cpc_publisher::TranslationPublisher;

#[derive(Default)]
struct QueueStats {
    published: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

/// Cloneable, non-blocking entry point to the queue.
#[derive(Clone)]
pub struct PublishHandle {
    tx: mpsc::UnboundedSender<String>,
    events: EventBusRef,
    stats: Arc<QueueStats>,
}

impl PublishHandle {
    /// Queue `text` for publishing. Returns false if the queue has shut
    /// down, in which case the text is reported as a failed publish.
    pub fn enqueue(&self, text: impl Into<String>) -> bool {
        match self.tx.send(text.into()) {
            Ok(()) => true,
            Err(mpsc::error::SendError(text)) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("Publish queue closed, translation not published");
                report_failure(&self.events, text, "publish queue closed".to_string());
                false
            }
        }
    }

    pub fn published(&self) -> u64 {
        self.stats.published.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed.load(Ordering::Relaxed)
    }

    /// Translations offered after shutdown.
    pub fn rejected(&self) -> u64 {
        self.stats.rejected.load(Ordering::Relaxed)
    }
}

pub struct PublishingQueue {
    handle: PublishHandle,
    cancel: CancellationToken,
    worker: JoinHandle<()>,
}

impl PublishingQueue {
    /// Spawn the publish worker on the current tokio runtime.
    pub fn spawn(publisher: Arc<dyn TranslationPublisher>, events: EventBusRef) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let cancel = CancellationToken::new();

        let worker = tokio::spawn(publish_loop(
            rx,
            publisher,
            events.clone(),
            Arc::clone(&stats),
            cancel.clone(),
        ));

        Self {
            handle: PublishHandle { tx, events, stats },
            cancel,
            worker,
        }
    }

    pub fn handle(&self) -> PublishHandle {
        self.handle.clone()
    }

    /// Stop accepting new items and wait for queued ones to be published.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.worker.await {
            tracing::error!(error = %e, "Publish worker panicked");
        }
        tracing::info!(
            published = self.handle.published(),
            failed = self.handle.failed(),
            "Publish queue drained"
        );
    }
}

async fn publish_loop(
    mut rx: mpsc::UnboundedReceiver<String>,
    publisher: Arc<dyn TranslationPublisher>,
    events: EventBusRef,
    stats: Arc<QueueStats>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            item = rx.recv() => match item {
                Some(text) => publish_one(&*publisher, &events, &stats, text).await,
                None => return,
            },
            _ = cancel.cancelled() => break,
        }
    }

    rx.close();
    while let Some(text) = rx.recv().await {
        publish_one(&*publisher, &events, &stats, text).await;
    }
}

async fn publish_one(
    publisher: &dyn TranslationPublisher,
    events: &EventBusRef,
    stats: &QueueStats,
    text: String,
) {
    match publisher.publish(&text).await {
        Ok(()) => {
            stats.published.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, "Failed to publish translation");
            report_failure(events, text, e.to_string());
        }
    }
}

fn report_failure(events: &EventBusRef, text: String, error: String) {
    emit(
        events,
        event_names::PUBLISH_FAILED,
        &PublishFailedPayload {
            text,
            error,
            ts_ms: now_ms(),
        },
    );
}

pub(crate) fn emit<T: Serialize>(events: &EventBusRef, topic: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => events.emit(topic, value),
        Err(e) => tracing::warn!(topic, error = %e, "Failed to serialize event payload"),
    }
}
