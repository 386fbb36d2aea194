//! Synthetic output loop for exercising the publish path without audio.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use cpc_bus::now_ms;
use cpc_events::{event_names, EventBusRef, TranslationPayload};

use crate::publishing::{emit, PublishHandle};

pub const TEST_OUTPUT_TEXT: &str = "Test translation";

/// Emit a synthetic final translation every `interval` until cancelled.
///
/// Each message is both notified on `events` and queued for publishing.
/// The first message goes out one interval after the call. Returns the number
/// of messages emitted.
pub async fn run_test_output(
    interval: Duration,
    language: &str,
    publish: PublishHandle,
    events: EventBusRef,
    cancel: CancellationToken,
) -> u64 {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut emitted = 0u64;

    tracing::info!(interval_ms = interval.as_millis() as u64, "Test output mode, capture disabled");

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                emitted += 1;
                let text = format!("{TEST_OUTPUT_TEXT} #{emitted}");
                emit(
                    &events,
                    event_names::TRANSLATION_FINAL,
                    &TranslationPayload {
                        language: language.to_string(),
                        text: text.clone(),
                        ts_ms: now_ms(),
                    },
                );
                publish.enqueue(text);
            }
        }
    }

    tracing::info!(emitted, "Test output stopped");
    emitted
}
