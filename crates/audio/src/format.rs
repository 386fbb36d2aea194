use crate::ConversionError;

/// Sample rate of the speech format expected by the recognizer.
pub const TARGET_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SampleKind {
    I16,
    I32,
    U16,
    F32,
}

impl SampleKind {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::F32 => 4,
        }
    }

    pub fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        match format {
            cpal::SampleFormat::I16 => Some(Self::I16),
            cpal::SampleFormat::I32 => Some(Self::I32),
            cpal::SampleFormat::U16 => Some(Self::U16),
            cpal::SampleFormat::F32 => Some(Self::F32),
            _ => None,
        }
    }

    /// Decode one little-endian sample to a float in [-1.0, 1.0].
    #[inline]
    fn decode(self, bytes: &[u8]) -> f32 {
        match self {
            Self::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0,
            Self::U16 => (u16::from_le_bytes([bytes[0], bytes[1]]) as f32 - 32768.0) / 32768.0,
            Self::I32 => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            Self::F32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        }
    }
}

/// Shape of a PCM buffer. Fixed for the lifetime of a capture run.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioFormat {
    pub sample_rate: f64,
    pub channels: u16,
    pub sample_kind: SampleKind,
    /// Interleaved (LRLR...) when true, planar (LL..RR..) when false.
    pub interleaved: bool,
}

impl AudioFormat {
    pub fn new(
        sample_rate: f64,
        channels: u16,
        sample_kind: SampleKind,
        interleaved: bool,
    ) -> Result<Self, ConversionError> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(ConversionError::InvalidFrame(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        if channels == 0 {
            return Err(ConversionError::InvalidFrame(
                "channel count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            sample_rate,
            channels,
            sample_kind,
            interleaved,
        })
    }

    /// 16 kHz, mono, signed 16-bit.
    pub fn speech() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE as f64,
            channels: 1,
            sample_kind: SampleKind::I16,
            interleaved: true,
        }
    }

    /// Format of a `cpal` input config. `None` for sample formats we do not decode.
    pub fn from_cpal(config: &cpal::SupportedStreamConfig) -> Option<Self> {
        let sample_kind = SampleKind::from_cpal(config.sample_format())?;
        Some(Self {
            sample_rate: config.sample_rate().0 as f64,
            channels: config.channels().max(1),
            sample_kind,
            interleaved: true,
        })
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.sample_kind.bytes_per_sample()
    }
}

/// A sample type the capture callback can encode into a frame payload.
pub trait RawSample: Copy + Send + 'static {
    const KIND: SampleKind;

    fn extend_le(self, out: &mut Vec<u8>);
}

impl RawSample for i16 {
    const KIND: SampleKind = SampleKind::I16;

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RawSample for i32 {
    const KIND: SampleKind = SampleKind::I32;

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RawSample for u16 {
    const KIND: SampleKind = SampleKind::U16;

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

impl RawSample for f32 {
    const KIND: SampleKind = SampleKind::F32;

    #[inline]
    fn extend_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }
}

/// A buffer of little-endian PCM samples plus the format describing them.
///
/// `payload.len() == frame_count * channels * bytes_per_sample` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmFrame {
    format: AudioFormat,
    frame_count: usize,
    payload: Vec<u8>,
}

impl PcmFrame {
    pub fn new(
        format: AudioFormat,
        frame_count: usize,
        payload: Vec<u8>,
    ) -> Result<Self, ConversionError> {
        let expected = frame_count * format.bytes_per_frame();
        if payload.len() != expected {
            return Err(ConversionError::InvalidFrame(format!(
                "payload is {} bytes, {} frames of {:?} x{} need {}",
                payload.len(),
                frame_count,
                format.sample_kind,
                format.channels,
                expected
            )));
        }
        Ok(Self {
            format,
            frame_count,
            payload,
        })
    }

    /// Copy interleaved device samples into a frame.
    ///
    /// Trailing samples that do not fill a whole frame are discarded.
    pub fn from_samples<S: RawSample>(sample_rate: f64, channels: u16, samples: &[S]) -> Self {
        let channels = channels.max(1);
        let frame_count = samples.len() / channels as usize;
        let used = frame_count * channels as usize;
        let mut payload = Vec::with_capacity(used * S::KIND.bytes_per_sample());
        for &sample in &samples[..used] {
            sample.extend_le(&mut payload);
        }
        Self {
            format: AudioFormat {
                sample_rate,
                channels,
                sample_kind: S::KIND,
                interleaved: true,
            },
            frame_count,
            payload,
        }
    }

    pub fn format(&self) -> &AudioFormat {
        &self.format
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.payload
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count as f64 / self.format.sample_rate
    }

    /// Sample for `frame` on `channel` as a float in [-1.0, 1.0].
    #[inline]
    pub(crate) fn sample_at(&self, frame: usize, channel: usize) -> f32 {
        let channels = self.format.channels as usize;
        let index = if self.format.interleaved {
            frame * channels + channel
        } else {
            channel * self.frame_count + frame
        };
        let width = self.format.sample_kind.bytes_per_sample();
        let start = index * width;
        self.format
            .sample_kind
            .decode(&self.payload[start..start + width])
    }

    /// Average of all channels for `frame`.
    #[inline]
    pub(crate) fn mono_at(&self, frame: usize) -> f32 {
        let channels = self.format.channels as usize;
        if channels == 1 {
            return self.sample_at(frame, 0);
        }
        let sum: f32 = (0..channels).map(|c| self.sample_at(frame, c)).sum();
        sum / channels as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(SampleKind::I16.bytes_per_sample(), 2);
        assert_eq!(SampleKind::U16.bytes_per_sample(), 2);
        assert_eq!(SampleKind::I32.bytes_per_sample(), 4);
        assert_eq!(SampleKind::F32.bytes_per_sample(), 4);
    }

    #[test]
    fn test_format_validation() {
        assert!(AudioFormat::new(0.0, 1, SampleKind::I16, true).is_err());
        assert!(AudioFormat::new(f64::NAN, 1, SampleKind::I16, true).is_err());
        assert!(AudioFormat::new(16000.0, 0, SampleKind::I16, true).is_err());
        assert_eq!(
            AudioFormat::new(16000.0, 1, SampleKind::I16, true).unwrap(),
            AudioFormat::speech()
        );
    }

    #[test]
    fn test_frame_rejects_wrong_payload_length() {
        let format = AudioFormat::new(48000.0, 2, SampleKind::F32, true).unwrap();
        assert!(PcmFrame::new(format, 10, vec![0; 80]).is_ok());
        assert!(matches!(
            PcmFrame::new(format, 10, vec![0; 79]),
            Err(ConversionError::InvalidFrame(_))
        ));
    }

    #[test]
    fn test_from_samples_drops_partial_frame() {
        let frame = PcmFrame::from_samples(44100.0, 2, &[0.5f32, -0.5, 0.25]);
        assert_eq!(frame.frame_count(), 1);
        assert_eq!(frame.as_bytes().len(), 8);
        assert_eq!(frame.format().sample_kind, SampleKind::F32);
    }

    #[test]
    fn test_decode_kinds() {
        let frame = PcmFrame::from_samples(8000.0, 1, &[i16::MIN, 0, 16384]);
        assert_eq!(frame.sample_at(0, 0), -1.0);
        assert_eq!(frame.sample_at(1, 0), 0.0);
        assert_eq!(frame.sample_at(2, 0), 0.5);

        let frame = PcmFrame::from_samples(8000.0, 1, &[0u16, 32768, 49152]);
        assert_eq!(frame.sample_at(0, 0), -1.0);
        assert_eq!(frame.sample_at(1, 0), 0.0);
        assert_eq!(frame.sample_at(2, 0), 0.5);

        let frame = PcmFrame::from_samples(8000.0, 1, &[i32::MIN, 1 << 30]);
        assert_eq!(frame.sample_at(0, 0), -1.0);
        assert_eq!(frame.sample_at(1, 0), 0.5);
    }

    #[test]
    fn test_planar_layout() {
        // Two frames, left channel first then right channel
        let mut payload = Vec::new();
        for s in [0.1f32, 0.2, 0.3, 0.4] {
            payload.extend_from_slice(&s.to_le_bytes());
        }
        let format = AudioFormat::new(16000.0, 2, SampleKind::F32, false).unwrap();
        let frame = PcmFrame::new(format, 2, payload).unwrap();

        assert_eq!(frame.sample_at(0, 0), 0.1);
        assert_eq!(frame.sample_at(1, 0), 0.2);
        assert_eq!(frame.sample_at(0, 1), 0.3);
        assert_eq!(frame.sample_at(1, 1), 0.4);
        assert!((frame.mono_at(0) - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_duration() {
        let frame = PcmFrame::from_samples(48000.0, 2, &vec![0.0f32; 9600]);
        assert!((frame.duration_secs() - 0.1).abs() < 1e-9);
    }
}
