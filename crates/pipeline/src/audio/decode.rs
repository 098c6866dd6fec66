use std::io::Cursor;

use crate::error::AudioError;

pub(crate) struct DecodedAudio {
    /// Mono samples in [-1.0, 1.0], still at the source rate.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decodes in-memory WAV bytes and downmixes to mono.
///
/// The container is sniffed first so non-WAV input reports as unsupported
/// rather than as a corrupt file.
pub(crate) fn decode_wav_bytes(bytes: &[u8]) -> Result<DecodedAudio, AudioError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(AudioError::UnsupportedFormat);
    }

    let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::InvalidChannels { channels: 0 });
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    if interleaved.is_empty() {
        return Err(AudioError::Empty);
    }

    let channels = spec.channels as usize;
    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
    })
}
