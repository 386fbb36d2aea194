//! Bounded hand-off from a real-time producer to a single worker.
//!
//! The producer side never blocks: a full bus drops the newest frame and
//! counts it. Every frame carries a monotonic sequence number so the consumer
//! can detect what was lost.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Default buffer capacity in milliseconds.
pub const DEFAULT_BUFFER_CAPACITY_MS: u32 = 1000;

/// Typical device buffer duration used to size the channel.
pub const DEFAULT_FRAME_DURATION_MS: u32 = 20;

/// Lower bound on the number of queued frames.
const MIN_CHANNEL_CAPACITY: usize = 8;

/// A payload tagged with its capture order and wall-clock capture time.
#[derive(Debug, Clone)]
pub struct Sequenced<T> {
    /// Monotonic sequence number for ordering.
    pub seq: u64,
    /// Wall clock in milliseconds when the payload was captured.
    pub ts_ms: i64,
    pub payload: T,
}

/// Configuration for the frame bus.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Target buffer capacity in milliseconds.
    pub capacity_ms: u32,
    /// Expected frame duration in milliseconds (for calculating channel capacity).
    pub frame_duration_ms: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity_ms: DEFAULT_BUFFER_CAPACITY_MS,
            frame_duration_ms: DEFAULT_FRAME_DURATION_MS,
        }
    }
}

impl BusConfig {
    /// Channel capacity in number of frames.
    pub fn channel_capacity(&self) -> usize {
        if self.frame_duration_ms == 0 {
            return 32;
        }
        ((self.capacity_ms / self.frame_duration_ms) as usize).max(MIN_CHANNEL_CAPACITY)
    }
}

/// Sender half of the bus. Safe to call from a real-time callback.
pub struct FrameSender<T> {
    tx: mpsc::Sender<Sequenced<T>>,
    seq_counter: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for FrameSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            seq_counter: Arc::clone(&self.seq_counter),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> FrameSender<T> {
    /// Hand a payload to the consumer, dropping it if the bus is full.
    ///
    /// Returns true if queued, false if dropped or the bus is closed.
    pub fn send(&self, ts_ms: i64, payload: T) -> bool {
        let seq = self.seq_counter.fetch_add(1, Ordering::Relaxed);

        match self.tx.try_send(Sequenced {
            seq,
            ts_ms,
            payload,
        }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // Only every 10th drop is logged to keep the callback quiet
                if dropped % 10 == 1 {
                    tracing::warn!(dropped, seq, "Frame bus full, dropping frames");
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Number of frames dropped because the bus was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Next sequence number to be assigned.
    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::Relaxed)
    }
}

/// Receiver half of the bus. Exactly one exists per bus.
pub struct FrameReceiver<T> {
    rx: mpsc::Receiver<Sequenced<T>>,
    next_seq: u64,
    gaps_detected: u64,
}

impl<T> FrameReceiver<T> {
    fn track(&mut self, frame: &Sequenced<T>) {
        if frame.seq > self.next_seq {
            let gap = frame.seq - self.next_seq;
            self.gaps_detected += gap;
            tracing::debug!(
                "Frame bus gap detected: {} frames missing (expected {} got {})",
                gap,
                self.next_seq,
                frame.seq
            );
        }
        self.next_seq = frame.seq + 1;
    }

    /// Receive the next frame.
    pub async fn recv(&mut self) -> Option<Sequenced<T>> {
        let frame = self.rx.recv().await?;
        self.track(&frame);
        Some(frame)
    }

    /// Receive the next frame from a non-async worker thread.
    ///
    /// Returns `None` once every sender is gone and the queue is drained.
    /// Must not be called from inside an async runtime.
    pub fn blocking_recv(&mut self) -> Option<Sequenced<T>> {
        let frame = self.rx.blocking_recv()?;
        self.track(&frame);
        Some(frame)
    }

    /// Try to receive a frame without blocking.
    pub fn try_recv(&mut self) -> Option<Sequenced<T>> {
        let frame = self.rx.try_recv().ok()?;
        self.track(&frame);
        Some(frame)
    }

    /// Number of sequence numbers that never arrived.
    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected
    }
}

/// Bounded frame bus.
pub struct FrameBus<T> {
    sender: FrameSender<T>,
    receiver: Option<FrameReceiver<T>>,
}

impl<T> FrameBus<T> {
    /// Create a new bus with default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    pub fn with_config(config: BusConfig) -> Self {
        let capacity = config.channel_capacity();
        let (tx, rx) = mpsc::channel(capacity);

        tracing::debug!(
            "Created frame bus: capacity={}ms (~{} frames of {}ms)",
            config.capacity_ms,
            capacity,
            config.frame_duration_ms
        );

        Self {
            sender: FrameSender {
                tx,
                seq_counter: Arc::new(AtomicU64::new(0)),
                dropped: Arc::new(AtomicU64::new(0)),
            },
            receiver: Some(FrameReceiver {
                rx,
                next_seq: 0,
                gaps_detected: 0,
            }),
        }
    }

    pub fn sender(&self) -> FrameSender<T> {
        self.sender.clone()
    }

    /// Take the receiver (can only be called once).
    pub fn take_receiver(&mut self) -> Option<FrameReceiver<T>> {
        self.receiver.take()
    }

    /// Split into sender and receiver, consuming the bus.
    pub fn split(mut self) -> (FrameSender<T>, Option<FrameReceiver<T>>) {
        let receiver = self.receiver.take();
        (self.sender, receiver)
    }
}

impl<T> Default for FrameBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Milliseconds since the Unix epoch, 0 if the clock is before it.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Capture pipeline counters, updated lock-free from the hot path.
///
/// Shared as `Arc<PipelineStatus>` between the capture callback, the
/// conversion worker and whoever reports on the pipeline.
#[derive(Debug, Default)]
pub struct PipelineStatus {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    frames_converted: AtomicU64,
    conversion_failures: AtomicU64,
    bytes_streamed: AtomicU64,
    gaps_detected: AtomicU64,
    /// now - capture timestamp of the last converted frame.
    capture_lag_ms: AtomicI64,
}

impl PipelineStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    pub fn frames_converted(&self) -> u64 {
        self.frames_converted.load(Ordering::Relaxed)
    }

    pub fn conversion_failures(&self) -> u64 {
        self.conversion_failures.load(Ordering::Relaxed)
    }

    pub fn bytes_streamed(&self) -> u64 {
        self.bytes_streamed.load(Ordering::Relaxed)
    }

    pub fn gaps_detected(&self) -> u64 {
        self.gaps_detected.load(Ordering::Relaxed)
    }

    pub fn capture_lag_ms(&self) -> i64 {
        self.capture_lag_ms.load(Ordering::Relaxed)
    }

    pub fn record_captured(&self, queued: bool) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
        if !queued {
            self.frames_dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_converted(&self, bytes: usize, captured_at_ms: i64) {
        self.frames_converted.fetch_add(1, Ordering::Relaxed);
        self.bytes_streamed.fetch_add(bytes as u64, Ordering::Relaxed);
        self.capture_lag_ms
            .store(now_ms() - captured_at_ms, Ordering::Relaxed);
    }

    pub fn record_conversion_failure(&self) {
        self.conversion_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_gaps_detected(&self, value: u64) {
        self.gaps_detected.store(value, Ordering::Relaxed);
    }

    /// Create a snapshot for serialization/display.
    pub fn snapshot(&self) -> PipelineStatusSnapshot {
        PipelineStatusSnapshot {
            frames_captured: self.frames_captured(),
            frames_dropped: self.frames_dropped(),
            frames_converted: self.frames_converted(),
            conversion_failures: self.conversion_failures(),
            bytes_streamed: self.bytes_streamed(),
            gaps_detected: self.gaps_detected(),
            capture_lag_ms: self.capture_lag_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PipelineStatusSnapshot {
    pub frames_captured: u64,
    pub frames_dropped: u64,
    pub frames_converted: u64,
    pub conversion_failures: u64,
    pub bytes_streamed: u64,
    pub gaps_detected: u64,
    pub capture_lag_ms: i64,
}
