mod capture;
mod converter;
mod device;
mod format;
mod recording;
mod sink;
mod worker;

pub use capture::{AudioCapture, AudioCaptureEngine, CaptureConfig};
pub use converter::{output_frame_count, FormatConverter};
pub use device::{list_input_devices, InputDevice};
pub use format::{AudioFormat, PcmFrame, RawSample, SampleKind, TARGET_SAMPLE_RATE};
pub use recording::RecordingSink;
pub use sink::{SinkRef, StreamingSink};
pub use worker::ConversionWorker;

/// Failure to bring up capture. Fatal to the attempt; `start` can be retried.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("device error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("default config error: {0}")]
    DefaultConfigError(#[from] cpal::DefaultStreamConfigError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
    #[error("play stream error: {0}")]
    PlayStreamError(#[from] cpal::PlayStreamError),
}

/// Per-frame conversion failure. The frame is dropped; capture continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionError {
    #[error("no converter for frame format {received} (configured for {configured})")]
    EngineUnavailable { configured: String, received: String },
    #[error("could not allocate output buffer for {0} frames")]
    BufferAllocationFailed(usize),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("resampler unavailable: {0}")]
    ResamplerUnavailable(String),
    #[error("resample failed: {0}")]
    Resample(String),
}

pub type Result<T> = std::result::Result<T, CaptureError>;
