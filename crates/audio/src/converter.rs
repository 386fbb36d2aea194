use std::collections::VecDeque;

use rubato::{FftFixedIn, Resampler};

use crate::format::{AudioFormat, PcmFrame, TARGET_SAMPLE_RATE};
use crate::ConversionError;

/// Requested input chunk for the FFT resampler. Rubato rounds it to a
/// multiple of the rate ratio.
const RESAMPLER_CHUNK_SIZE: usize = 256;
const RESAMPLER_SUB_CHUNKS: usize = 2;

/// Number of 16 kHz frames covering the same duration as the input.
pub fn output_frame_count(input_frames: usize, input_rate: f64) -> usize {
    if input_rate <= 0.0 {
        return 0;
    }
    (input_frames as f64 / input_rate * TARGET_SAMPLE_RATE as f64).round() as usize
}

/// Band-limited streaming resampler.
///
/// Mono input is collected into fixed chunks for rubato; resampled audio
/// waits in `ready` until a frame takes it. Each frame takes exactly the
/// number of samples its duration calls for, so the FFT latency shows up
/// once at stream start as leading silence.
struct StreamResampler {
    fft: FftFixedIn<f32>,
    pending: Vec<f32>,
    ready: VecDeque<f32>,
    last: f32,
}

impl StreamResampler {
    fn new(input_rate: usize, output_rate: usize) -> Result<Self, ConversionError> {
        let fft = FftFixedIn::<f32>::new(
            input_rate,
            output_rate,
            RESAMPLER_CHUNK_SIZE,
            RESAMPLER_SUB_CHUNKS,
            1,
        )
        .map_err(|e| ConversionError::ResamplerUnavailable(e.to_string()))?;
        let chunk = fft.input_frames_max();

        Ok(Self {
            fft,
            pending: Vec::with_capacity(chunk * 2),
            ready: VecDeque::new(),
            last: 0.0,
        })
    }

    fn push(&mut self, samples: impl Iterator<Item = f32>) -> Result<(), ConversionError> {
        self.pending.extend(samples);

        let mut start = 0;
        loop {
            let needed = self.fft.input_frames_next();
            if self.pending.len() - start < needed {
                break;
            }
            let out = self
                .fft
                .process(&[&self.pending[start..start + needed]], None)
                .map_err(|e| ConversionError::Resample(e.to_string()))?;
            if let Some(channel) = out.first() {
                self.ready.extend(channel.iter().copied());
            }
            start += needed;
        }
        self.pending.drain(..start);
        Ok(())
    }

    /// Take exactly `count` samples, holding the last one if short.
    fn take(&mut self, count: usize, mut emit: impl FnMut(f32)) {
        for _ in 0..count {
            if let Some(sample) = self.ready.pop_front() {
                self.last = sample;
            }
            emit(self.last);
        }

        // Per-frame rounding can fall behind the resampler; keep the
        // leftover to about two chunks so latency stays flat.
        let max_backlog = self.fft.output_frames_max() * 2;
        if self.ready.len() > max_backlog {
            let excess = self.ready.len() - max_backlog;
            self.ready.drain(..excess);
        }
    }
}

/// Converts device frames to 16 kHz mono signed 16-bit PCM.
///
/// A converter is bound to the device format negotiated at capture start.
/// Frames in any other format are rejected rather than guessed at. It keeps
/// resampler state across frames, so one converter serves one stream.
pub struct FormatConverter {
    input: AudioFormat,
    output: AudioFormat,
    resampler: Option<StreamResampler>,
}

impl FormatConverter {
    pub fn new(input: AudioFormat) -> Result<Self, ConversionError> {
        let output = AudioFormat::speech();
        let resampler = if input.sample_rate == output.sample_rate {
            None
        } else {
            Some(StreamResampler::new(
                input.sample_rate.round() as usize,
                TARGET_SAMPLE_RATE as usize,
            )?)
        };

        Ok(Self {
            input,
            output,
            resampler,
        })
    }

    pub fn input_format(&self) -> &AudioFormat {
        &self.input
    }

    pub fn output_format(&self) -> &AudioFormat {
        &self.output
    }

    pub fn convert(&mut self, input: PcmFrame) -> Result<PcmFrame, ConversionError> {
        if *input.format() != self.input {
            return Err(ConversionError::EngineUnavailable {
                configured: format!("{:?}", self.input),
                received: format!("{:?}", input.format()),
            });
        }

        // Already in the speech format: pass through untouched
        if self.input == self.output {
            return Ok(input);
        }

        let out_frames = output_frame_count(input.frame_count(), input.format().sample_rate);
        let mut payload = Vec::new();
        payload
            .try_reserve_exact(out_frames * self.output.bytes_per_frame())
            .map_err(|_| ConversionError::BufferAllocationFailed(out_frames))?;
        let mut emit = |sample: f32| payload.extend_from_slice(&quantize(sample).to_le_bytes());

        let mono = (0..input.frame_count()).map(|i| input.mono_at(i));
        match self.resampler.as_mut() {
            Some(resampler) => {
                resampler.push(mono)?;
                resampler.take(out_frames, emit);
            }
            None => mono.for_each(&mut emit),
        }

        PcmFrame::new(self.output, out_frames, payload)
    }
}

#[inline]
fn quantize(sample: f32) -> i16 {
    (sample * 32767.0).round().clamp(-32768.0, 32767.0) as i16
}
