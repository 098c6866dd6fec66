//! Audio ingestion: decode, downmix, resample, silence trim.
//!
//! Everything downstream of this module works on a [`Waveform`]: mono f32
//! samples at the canonical 16 kHz rate, immutable and cheaply shareable.

pub mod chunk;
mod decode;
mod resample;
mod trim;

pub use chunk::{AudioChunk, UploadLimits, split_chunks};

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::AudioError;

/// Canonical sample rate expected by both external services.
pub const SAMPLE_RATE: u32 = 16_000;

/// Byte size of the PCM WAV header we produce for uploads.
pub(crate) const WAV_HEADER_BYTES: u64 = 44;

/// An immutable mono waveform at [`SAMPLE_RATE`].
///
/// Samples live behind an `Arc` so chunks can borrow slices of the same
/// buffer without copying.
#[derive(Debug, Clone)]
pub struct Waveform {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: 1,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub(crate) fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Estimated upload size as 16-bit PCM WAV.
    pub fn encoded_wav_bytes(&self) -> u64 {
        WAV_HEADER_BYTES + self.samples.len() as u64 * 2
    }
}

/// Encodes mono f32 samples as a 16-bit PCM WAV body for upload.
pub(crate) fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer.write_sample((clamped * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Result of normalization: the canonical waveform plus any degradation
/// markers (currently only the skipped-trim warning).
#[derive(Debug)]
pub struct NormalizedAudio {
    pub waveform: Waveform,
    pub warnings: Vec<String>,
}

/// Converts raw audio bytes into the canonical waveform.
///
/// Decode (WAV only; anything else is the caller's job to convert first),
/// downmix to mono, resample to 16 kHz, then trim leading/trailing silence
/// under the configured guard. Pure: same bytes and config, same output.
pub fn normalize(bytes: &[u8], config: &PipelineConfig) -> Result<NormalizedAudio, AudioError> {
    let decoded = decode::decode_wav_bytes(bytes)?;
    debug!(
        samples = decoded.samples.len(),
        sample_rate = decoded.sample_rate,
        "Audio decoded"
    );

    let samples = if decoded.sample_rate == SAMPLE_RATE {
        decoded.samples
    } else {
        resample::resample(&decoded.samples, decoded.sample_rate, SAMPLE_RATE)?
    };

    if samples.is_empty() {
        return Err(AudioError::Empty);
    }

    let mut warnings = Vec::new();
    let outcome = trim::trim_silence(
        &samples,
        config.trim_threshold_db,
        config.trim_max_fraction,
    );
    if let Some(reason) = outcome.skipped {
        warnings.push(format!("silence trim skipped: {reason}"));
    }

    let trimmed: Vec<f32> = samples[outcome.range.clone()].to_vec();
    let waveform = Waveform::new(trimmed, SAMPLE_RATE);
    info!(
        duration_secs = waveform.duration_secs(),
        trimmed_samples = samples.len() - waveform.len(),
        "Audio normalized"
    );

    Ok(NormalizedAudio { waveform, warnings })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Builds a waveform of the given duration filled with a constant value.
    pub fn waveform_secs(duration_secs: f64, value: f32) -> Waveform {
        let len = (duration_secs * SAMPLE_RATE as f64).round() as usize;
        Waveform::new(vec![value; len], SAMPLE_RATE)
    }
}
