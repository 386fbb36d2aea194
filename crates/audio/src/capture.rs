use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};

use cpc_bus::{now_ms, BusConfig, FrameBus, FrameSender, PipelineStatus};

use crate::converter::FormatConverter;
use crate::device::resolve_input_device;
use crate::format::{AudioFormat, PcmFrame, RawSample};
use crate::sink::SinkRef;
use crate::worker::ConversionWorker;
use crate::{CaptureError, Result};

/// Something that can be started and stopped as the audio source of a pipeline.
pub trait AudioCapture {
    fn start(&mut self) -> Result<()>;

    /// Stop capturing. Must be a no-op when not started.
    fn stop(&mut self);

    fn is_running(&self) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct CaptureConfig {
    /// Input device name, `None` for the host default.
    pub device_name: Option<String>,
    pub bus: BusConfig,
}

struct RunningCapture {
    // Field order matters: the stream (and its frame sender) must drop
    // before the worker is joined.
    stream: Stream,
    worker: ConversionWorker,
    format: AudioFormat,
}

/// Microphone capture through `cpal`, feeding a [`StreamingSink`](crate::StreamingSink).
///
/// The input callback only copies the device buffer into a [`PcmFrame`] and
/// queues it on a bounded bus; conversion and sink writes happen on the
/// conversion worker.
pub struct AudioCaptureEngine {
    config: CaptureConfig,
    sink: SinkRef,
    status: Arc<PipelineStatus>,
    running: Option<RunningCapture>,
}

impl AudioCaptureEngine {
    pub fn new(config: CaptureConfig, sink: SinkRef) -> Self {
        Self {
            config,
            sink,
            status: Arc::new(PipelineStatus::new()),
            running: None,
        }
    }

    pub fn status(&self) -> Arc<PipelineStatus> {
        Arc::clone(&self.status)
    }

    /// Native format negotiated with the device, while running.
    pub fn device_format(&self) -> Option<AudioFormat> {
        self.running.as_ref().map(|r| r.format)
    }

    fn start_capture(&self) -> Result<RunningCapture> {
        let host = cpal::default_host();
        let device = resolve_input_device(&host, self.config.device_name.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device.default_input_config()?;
        let format = AudioFormat::from_cpal(&supported).ok_or_else(|| {
            CaptureError::UnsupportedFormat(format!("{:?}", supported.sample_format()))
        })?;
        tracing::info!(
            device = %device_name,
            sample_rate = format.sample_rate,
            channels = format.channels,
            sample_kind = ?format.sample_kind,
            "Negotiated capture format"
        );

        let (sender, receiver) = FrameBus::with_config(self.config.bus.clone()).split();
        let receiver = receiver
            .ok_or_else(|| CaptureError::StreamError("frame bus receiver missing".to_string()))?;

        let converter = FormatConverter::new(format)
            .map_err(|e| CaptureError::UnsupportedFormat(e.to_string()))?;
        let worker = ConversionWorker::spawn(
            receiver,
            converter,
            Arc::clone(&self.sink),
            Arc::clone(&self.status),
        )?;

        // On any error below the sender is dropped with the closure and the
        // worker exits on its own when `worker` is dropped.
        let stream = build_input_stream(&device, &supported, format, sender, &self.status)?;
        stream.play()?;

        Ok(RunningCapture {
            stream,
            worker,
            format,
        })
    }
}

impl AudioCapture for AudioCaptureEngine {
    fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            tracing::debug!("Capture already running");
            return Ok(());
        }

        match self.start_capture() {
            Ok(running) => {
                self.running = Some(running);
                tracing::info!("Audio capture started");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start audio capture");
                Err(e)
            }
        }
    }

    fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        // Detach the callback first so no new frames are queued, then let the
        // worker drain what was already captured.
        drop(running.stream);
        running.worker.join();

        let snapshot = self.status.snapshot();
        tracing::info!(
            frames_captured = snapshot.frames_captured,
            frames_dropped = snapshot.frames_dropped,
            frames_converted = snapshot.frames_converted,
            conversion_failures = snapshot.conversion_failures,
            bytes_streamed = snapshot.bytes_streamed,
            "Audio capture stopped"
        );
    }

    fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_input_stream(
    device: &Device,
    supported: &SupportedStreamConfig,
    format: AudioFormat,
    sender: FrameSender<PcmFrame>,
    status: &Arc<PipelineStatus>,
) -> Result<Stream> {
    match supported.sample_format() {
        SampleFormat::F32 => build_typed_stream::<f32>(device, supported, format, sender, status),
        SampleFormat::I16 => build_typed_stream::<i16>(device, supported, format, sender, status),
        SampleFormat::I32 => build_typed_stream::<i32>(device, supported, format, sender, status),
        SampleFormat::U16 => build_typed_stream::<u16>(device, supported, format, sender, status),
        other => Err(CaptureError::UnsupportedFormat(format!("{other:?}"))),
    }
}

fn build_typed_stream<S>(
    device: &Device,
    supported: &SupportedStreamConfig,
    format: AudioFormat,
    sender: FrameSender<PcmFrame>,
    status: &Arc<PipelineStatus>,
) -> Result<Stream>
where
    S: RawSample + cpal::SizedSample,
{
    let status = Arc::clone(status);
    let stream = device.build_input_stream(
        &supported.config(),
        move |data: &[S], _| {
            let frame = PcmFrame::from_samples(format.sample_rate, format.channels, data);
            let queued = sender.send(now_ms(), frame);
            status.record_captured(queued);
        },
        |err| tracing::error!("audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}
