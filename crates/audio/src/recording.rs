use hound::{WavSpec, WavWriter};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::format::TARGET_SAMPLE_RATE;
use crate::sink::{SinkRef, StreamingSink};

type Writer = WavWriter<BufWriter<File>>;

/// Tees the converted stream into a WAV file before forwarding it.
///
/// Recording problems are logged and disable the recording; they never
/// interrupt the stream to `inner`.
pub struct RecordingSink {
    path: PathBuf,
    writer: Mutex<Option<Writer>>,
    inner: SinkRef,
}

impl RecordingSink {
    pub fn create(path: impl AsRef<Path>, inner: SinkRef) -> crate::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: 1,
            sample_rate: TARGET_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let file = File::create(&path).map_err(|e| {
            crate::CaptureError::StreamError(format!("failed to create {}: {e}", path.display()))
        })?;
        let writer = WavWriter::new(BufWriter::new(file), spec).map_err(|e| {
            crate::CaptureError::StreamError(format!("failed to create wav writer: {e}"))
        })?;
        tracing::info!(path = %path.display(), "Recording converted audio");

        Ok(Self {
            path,
            writer: Mutex::new(Some(writer)),
            inner,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the WAV file. Later writes are only forwarded.
    pub fn finish(&self) -> crate::Result<()> {
        let writer = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(writer) = writer {
            writer.finalize().map_err(|e| {
                crate::CaptureError::StreamError(format!("failed to finalize wav: {e}"))
            })?;
            tracing::info!(path = %self.path.display(), "Recording finalized");
        }
        Ok(())
    }

    fn record(&self, bytes: &[u8]) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        let Some(writer) = guard.as_mut() else {
            return;
        };

        for pair in bytes.chunks_exact(2) {
            if let Err(e) = writer.write_sample(i16::from_le_bytes([pair[0], pair[1]])) {
                tracing::warn!(error = %e, path = %self.path.display(), "Recording failed, disabling it");
                *guard = None;
                return;
            }
        }
    }
}

impl StreamingSink for RecordingSink {
    fn write(&self, bytes: Vec<u8>) {
        self.record(&bytes);
        self.inner.write(bytes);
    }
}

impl Drop for RecordingSink {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(error = %e, "Failed to finalize recording on drop");
        }
    }
}
