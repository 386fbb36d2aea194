//! Conversion worker: the single consumer of captured frames.
//!
//! Runs on its own thread so format conversion and sink writes never happen
//! on the real-time audio callback.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use cpc_bus::{FrameReceiver, PipelineStatus};

use crate::converter::FormatConverter;
use crate::format::PcmFrame;
use crate::sink::SinkRef;
use crate::CaptureError;

/// Handle to a running conversion thread.
///
/// The thread exits once every frame sender is dropped and the queue has
/// been drained, so frames already captured still reach the sink.
pub struct ConversionWorker {
    handle: Option<JoinHandle<()>>,
}

impl ConversionWorker {
    pub fn spawn(
        receiver: FrameReceiver<PcmFrame>,
        converter: FormatConverter,
        sink: SinkRef,
        status: Arc<PipelineStatus>,
    ) -> Result<Self, CaptureError> {
        let handle = thread::Builder::new()
            .name("cpc-conversion".to_string())
            .spawn(move || conversion_loop(receiver, converter, sink, status))
            .map_err(|e| CaptureError::StreamError(format!("failed to spawn conversion worker: {e}")))?;

        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the queue to drain. Senders must already be dropped.
    pub fn join(mut self) {
        self.join_inner();
    }

    fn join_inner(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Conversion worker panicked");
            }
        }
    }
}

impl Drop for ConversionWorker {
    fn drop(&mut self) {
        self.join_inner();
    }
}

fn conversion_loop(
    mut receiver: FrameReceiver<PcmFrame>,
    mut converter: FormatConverter,
    sink: SinkRef,
    status: Arc<PipelineStatus>,
) {
    tracing::info!(format = ?converter.input_format(), "Conversion worker started");
    let mut converted = 0u64;

    while let Some(frame) = receiver.blocking_recv() {
        match converter.convert(frame.payload) {
            Ok(pcm) => {
                status.record_converted(pcm.as_bytes().len(), frame.ts_ms);
                sink.write(pcm.into_bytes());
                converted += 1;
                if converted % 500 == 0 {
                    tracing::debug!(converted, seq = frame.seq, "Conversion worker progress");
                }
            }
            Err(e) => {
                status.record_conversion_failure();
                tracing::warn!(seq = frame.seq, error = %e, "Dropping frame that failed to convert");
            }
        }
    }

    status.set_gaps_detected(receiver.gaps_detected());
    tracing::info!(converted, "Conversion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use crate::sink::StreamingSink;
    use cpc_bus::FrameBus;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        writes: Mutex<Vec<Vec<u8>>>,
    }

    impl StreamingSink for CollectingSink {
        fn write(&self, bytes: Vec<u8>) {
            self.writes.lock().unwrap().push(bytes);
        }
    }

    #[test]
    fn test_frames_reach_sink_in_capture_order() {
        let bus = FrameBus::new();
        let (sender, receiver) = bus.split();
        let sink = Arc::new(CollectingSink::default());
        let status = Arc::new(PipelineStatus::new());

        let worker = ConversionWorker::spawn(
            receiver.unwrap(),
            FormatConverter::new(AudioFormat::speech()).unwrap(),
            sink.clone(),
            status.clone(),
        )
        .unwrap();

        for i in 0..5i16 {
            sender.send(0, PcmFrame::from_samples(16000.0, 1, &[i; 160]));
        }
        drop(sender);
        worker.join();

        let writes = sink.writes.lock().unwrap();
        assert_eq!(writes.len(), 5);
        for (i, bytes) in writes.iter().enumerate() {
            assert_eq!(bytes.len(), 320);
            assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i as i16);
        }
        assert_eq!(status.frames_converted(), 5);
        assert_eq!(status.bytes_streamed(), 1600);
    }

    #[test]
    fn test_bad_frame_is_dropped_and_worker_continues() {
        let bus = FrameBus::new();
        let (sender, receiver) = bus.split();
        let sink = Arc::new(CollectingSink::default());
        let status = Arc::new(PipelineStatus::new());

        let worker = ConversionWorker::spawn(
            receiver.unwrap(),
            FormatConverter::new(AudioFormat::speech()).unwrap(),
            sink.clone(),
            status.clone(),
        )
        .unwrap();

        sender.send(0, PcmFrame::from_samples(16000.0, 1, &[1i16; 160]));
        // Device switched to 48 kHz stereo float mid-run
        sender.send(0, PcmFrame::from_samples(48000.0, 2, &[0.0f32; 960]));
        sender.send(0, PcmFrame::from_samples(16000.0, 1, &[2i16; 160]));
        drop(sender);
        worker.join();

        assert_eq!(sink.writes.lock().unwrap().len(), 2);
        assert_eq!(status.conversion_failures(), 1);
        assert_eq!(status.frames_converted(), 2);
    }
}
