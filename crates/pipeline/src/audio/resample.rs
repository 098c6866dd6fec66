use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async as AsyncResampler, FixedAsync, Resampler as RubatoResampler,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::error::AudioError;

/// Resamples mono audio from `src_rate` to `dst_rate` using sinc interpolation.
///
/// The tail block is zero-padded to the resampler's fixed input size and the
/// output is truncated back to the exact expected length, so duration is
/// preserved to within one sample.
pub(crate) fn resample(audio: &[f32], src_rate: u32, dst_rate: u32) -> Result<Vec<f32>, AudioError> {
    if src_rate == dst_rate {
        return Ok(audio.to_vec());
    }

    let ratio = dst_rate as f64 / src_rate as f64;
    let chunk_size = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler = AsyncResampler::<f32>::new_sinc(
        ratio,
        2.0,
        &params,
        chunk_size,
        1, // mono
        FixedAsync::Input,
    )
    .map_err(|e| AudioError::Resample {
        message: format!("failed to create resampler: {e}"),
    })?;

    let expected_len = (audio.len() as f64 * ratio).round() as usize;
    let mut output = Vec::with_capacity(expected_len + chunk_size);

    for chunk in audio.chunks(chunk_size) {
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        } else {
            chunk.to_vec()
        };

        let frames = input.len();
        let input_adapter = InterleavedSlice::new(&input, 1, frames).map_err(|e| {
            AudioError::Resample {
                message: format!("input adapter error: {e}"),
            }
        })?;

        let result = resampler
            .process(&input_adapter, 0, None)
            .map_err(|e| AudioError::Resample {
                message: format!("resample error: {e}"),
            })?;

        output.extend(result.take_data());
    }

    // One block of silence pushes the tail of the audio out of the sinc
    // delay line; without it the last ~sinc_len/2 source samples never
    // surface and block-aligned inputs come up short.
    let flush = vec![0.0f32; chunk_size];
    let flush_adapter =
        InterleavedSlice::new(&flush, 1, chunk_size).map_err(|e| AudioError::Resample {
            message: format!("input adapter error: {e}"),
        })?;
    let result = resampler
        .process(&flush_adapter, 0, None)
        .map_err(|e| AudioError::Resample {
            message: format!("resample error: {e}"),
        })?;
    output.extend(result.take_data());

    output.truncate(expected_len);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_rate_is_a_copy() {
        let audio = vec![0.1, -0.2, 0.3];
        assert_eq!(resample(&audio, 16_000, 16_000).unwrap(), audio);
    }

    #[test]
    fn downsamples_to_expected_length() {
        let audio = vec![0.5f32; 48_000];
        let out = resample(&audio, 48_000, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn upsamples_to_expected_length() {
        let audio = vec![0.5f32; 8_000];
        let out = resample(&audio, 8_000, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);
    }

    #[test]
    fn preserves_a_dc_level_away_from_the_edges() {
        let audio = vec![0.4f32; 44_100];
        let out = resample(&audio, 44_100, 16_000).unwrap();
        // Sinc edges ring; the middle should hold the level.
        let mid = out.len() / 2;
        for &s in &out[mid - 100..mid + 100] {
            assert!((s - 0.4).abs() < 0.01, "sample {s} drifted from 0.4");
        }
    }
}
