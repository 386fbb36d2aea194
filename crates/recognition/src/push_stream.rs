//! Push-style audio input for an engine.
//!
//! The capture side writes converted PCM chunks; the engine side pulls them
//! at its own pace.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use cpc_audio::StreamingSink;

/// Default number of chunks buffered between capture and engine (~25 s of 100 ms chunks).
pub const DEFAULT_PUSH_CAPACITY: usize = 256;

#[derive(Default)]
struct Counters {
    bytes_written: AtomicU64,
    chunks_dropped: AtomicU64,
    closed: AtomicBool,
}

/// Writer half. Cheap to clone; every clone feeds the same reader.
#[derive(Clone)]
pub struct PushAudioStream {
    tx: Sender<Vec<u8>>,
    counters: Arc<Counters>,
}

/// Reader half, owned by the engine.
pub struct PushAudioReader {
    rx: Receiver<Vec<u8>>,
    counters: Arc<Counters>,
    bytes_received: u64,
}

pub fn push_stream() -> (PushAudioStream, PushAudioReader) {
    push_stream_with_capacity(DEFAULT_PUSH_CAPACITY)
}

pub fn push_stream_with_capacity(capacity: usize) -> (PushAudioStream, PushAudioReader) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let counters = Arc::new(Counters::default());
    (
        PushAudioStream {
            tx,
            counters: Arc::clone(&counters),
        },
        PushAudioReader {
            rx,
            counters,
            bytes_received: 0,
        },
    )
}

impl PushAudioStream {
    pub fn bytes_written(&self) -> u64 {
        self.counters.bytes_written.load(Ordering::Relaxed)
    }

    pub fn chunks_dropped(&self) -> u64 {
        self.counters.chunks_dropped.load(Ordering::Relaxed)
    }

    /// True once the reader has been closed or dropped.
    pub fn is_closed(&self) -> bool {
        self.counters.closed.load(Ordering::Relaxed)
    }
}

impl StreamingSink for PushAudioStream {
    fn write(&self, bytes: Vec<u8>) {
        if bytes.is_empty() || self.is_closed() {
            return;
        }
        let len = bytes.len() as u64;
        match self.tx.try_send(bytes) {
            Ok(()) => {
                self.counters.bytes_written.fetch_add(len, Ordering::Relaxed);
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.counters.chunks_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    tracing::warn!(dropped, "Engine not keeping up, dropping audio");
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.closed.store(true, Ordering::Relaxed);
                tracing::debug!("Push stream reader closed");
            }
        }
    }
}

impl PushAudioReader {
    /// Wait up to `timeout` for the next chunk.
    ///
    /// `Disconnected` means every writer is gone and the buffer is drained.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, RecvTimeoutError> {
        let chunk = self.rx.recv_timeout(timeout)?;
        self.bytes_received += chunk.len() as u64;
        Ok(chunk)
    }

    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        let chunk = self.rx.try_recv().ok()?;
        self.bytes_received += chunk.len() as u64;
        Some(chunk)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Chunks waiting to be read.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Stop accepting audio. Later writes become no-ops.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for PushAudioReader {
    fn drop(&mut self) {
        self.counters.closed.store(true, Ordering::Relaxed);
    }
}
