use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use super::{WAV_HEADER_BYTES, Waveform};
use crate::error::PipelineError;

/// Per-request budget advertised by a transcription backend.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    /// Hard cap on an encoded upload body, in bytes.
    pub max_upload_bytes: u64,
    /// Hard cap on a single chunk's duration, in seconds.
    pub max_chunk_secs: f64,
}

/// A contiguous window into the normalized waveform.
///
/// Chunks share the waveform's sample buffer, so cloning one is cheap and
/// splitting never copies audio. Start/end times are derived from the sample
/// range, which makes `chunk[i].end_secs() == chunk[i + 1].start_secs()` hold
/// exactly rather than approximately.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    index: usize,
    samples: Arc<[f32]>,
    range: Range<usize>,
    sample_rate: u32,
}

impl AudioChunk {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples[self.range.clone()]
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Offset of this chunk's first sample in the session, in seconds.
    pub fn start_secs(&self) -> f64 {
        self.range.start as f64 / self.sample_rate as f64
    }

    pub fn end_secs(&self) -> f64 {
        self.range.end as f64 / self.sample_rate as f64
    }

    pub fn duration_secs(&self) -> f64 {
        (self.range.end - self.range.start) as f64 / self.sample_rate as f64
    }
}

/// Splits a waveform into upload-sized chunks.
///
/// A waveform that fits the budget whole comes back as one chunk. Otherwise
/// the waveform is cut into equal-duration pieces, each boundary snapped to
/// the nearest sample, with the piece count reduced while an equal split
/// would leave chunks under `min_chunk_secs`. The byte cap is hard: pieces
/// never grow past what it allows, and a budget that cannot fit even a
/// minimum-duration chunk is rejected outright. The split depends only on
/// the waveform length and the limits, so it is reproducible.
pub fn split_chunks(
    waveform: &Waveform,
    limits: &UploadLimits,
    min_chunk_secs: f64,
) -> Result<Vec<AudioChunk>, PipelineError> {
    if waveform.is_empty() {
        return Err(PipelineError::ChunkingInvariant {
            detail: "cannot chunk an empty waveform".to_string(),
        });
    }

    let len = waveform.len();
    let rate = waveform.sample_rate();
    let duration = waveform.duration_secs();

    if waveform.encoded_wav_bytes() <= limits.max_upload_bytes
        && duration <= limits.max_chunk_secs
    {
        return Ok(vec![AudioChunk {
            index: 0,
            samples: waveform.shared_samples(),
            range: 0..len,
            sample_rate: rate,
        }]);
    }

    // The byte cap implies a duration cap for 16-bit mono PCM; the tighter
    // of the two drives the split.
    let bytes_per_sec = rate as f64 * 2.0;
    let secs_from_bytes =
        limits.max_upload_bytes.saturating_sub(WAV_HEADER_BYTES) as f64 / bytes_per_sec;
    let max_secs = limits.max_chunk_secs.min(secs_from_bytes);
    if max_secs <= 0.0 {
        return Err(PipelineError::ChunkingInvariant {
            detail: format!(
                "upload budget of {} bytes cannot fit any audio",
                limits.max_upload_bytes
            ),
        });
    }
    if secs_from_bytes < min_chunk_secs {
        return Err(PipelineError::ChunkingInvariant {
            detail: format!(
                "upload budget of {} bytes cannot fit the {min_chunk_secs}s minimum chunk",
                limits.max_upload_bytes
            ),
        });
    }

    let mut num = (duration / max_secs).ceil() as usize;
    // An equal split must not leave runt chunks; growing each piece past the
    // nominal duration cap is preferred over sending a sub-minimum chunk.
    // The byte cap stays hard, so the count never drops below what it needs.
    let min_num = (duration / secs_from_bytes).ceil() as usize;
    while num > min_num.max(1) && duration / (num as f64) < min_chunk_secs {
        num -= 1;
    }

    let mut chunks = Vec::with_capacity(num);
    for k in 0..num {
        let start = cut_index(k, num, len);
        let end = cut_index(k + 1, num, len);
        if start >= end {
            return Err(PipelineError::ChunkingInvariant {
                detail: format!("degenerate cut {start}..{end} for chunk {k} of {num}"),
            });
        }
        chunks.push(AudioChunk {
            index: k,
            samples: waveform.shared_samples(),
            range: start..end,
            sample_rate: rate,
        });
    }

    debug!(
        chunks = chunks.len(),
        duration_secs = duration,
        "Waveform split for upload"
    );
    Ok(chunks)
}

/// Sample index of the `k`-th of `num` equal cuts, snapped to the nearest
/// sample. The first cut is 0 and the last is `len` by construction.
fn cut_index(k: usize, num: usize, len: usize) -> usize {
    ((k as f64 * len as f64) / num as f64).round() as usize
}
