//! Rebases per-chunk transcripts to session time and stitches them together.

use tracing::{debug, info, warn};

use super::{ChunkTranscript, TranscriptSegment};
use crate::audio::AudioChunk;
use crate::config::PipelineConfig;

/// The merged, session-global transcript.
#[derive(Debug, Clone)]
pub struct MergedTranscript {
    /// Segments in non-decreasing start order, session-global time.
    pub segments: Vec<TranscriptSegment>,
    /// First language any chunk reported.
    pub language: Option<String>,
}

/// Merges chunk transcripts into one global segment list.
///
/// Each chunk's segments are shifted by the chunk's start offset, then
/// concatenated in chunk order. Where a chunk boundary made the service
/// transcribe the same words twice (context bleeding across a hard cut),
/// the pair is collapsed to the segment with the tighter time bound. The
/// final list is stable-sorted by start time.
pub fn merge_chunk_transcripts(
    chunks: &[AudioChunk],
    transcripts: &[ChunkTranscript],
    config: &PipelineConfig,
) -> MergedTranscript {
    debug_assert_eq!(chunks.len(), transcripts.len());

    let mut segments: Vec<TranscriptSegment> = Vec::new();
    let mut language = None;

    for (chunk, transcript) in chunks.iter().zip(transcripts) {
        if language.is_none() {
            language = transcript.language.clone();
        }

        let mut incoming: Vec<TranscriptSegment> = transcript
            .segments
            .iter()
            .filter(|s| keep_segment(chunk.index(), s))
            .map(|s| TranscriptSegment {
                start: s.start + chunk.start_secs(),
                end: s.end + chunk.start_secs(),
                text: s.text.clone(),
            })
            .collect();

        if let (Some(prev), Some(next)) = (segments.last(), incoming.first()) {
            if is_boundary_duplicate(prev, next, config) {
                // Keep whichever re-transcription is tighter in time.
                if duration(next) < duration(prev) {
                    let dropped = segments.pop();
                    debug!(?dropped, "Dropped boundary duplicate before chunk start");
                } else {
                    let dropped = incoming.remove(0);
                    debug!(?dropped, chunk = chunk.index(), "Dropped boundary duplicate at chunk start");
                }
            }
        }

        segments.append(&mut incoming);
    }

    if !segments.is_sorted_by(|a, b| a.start <= b.start) {
        debug!("Merge output arrived out of start order, sorting");
    }
    segments.sort_by(|a, b| a.start.total_cmp(&b.start));

    info!(
        segments = segments.len(),
        text_chars = segments.iter().map(|s| s.text.len()).sum::<usize>(),
        "Chunk transcripts merged"
    );

    MergedTranscript { segments, language }
}

/// Drops service output the merged transcript cannot represent: inverted or
/// negative time bounds and whitespace-only text.
fn keep_segment(chunk_index: usize, segment: &TranscriptSegment) -> bool {
    if !segment.start.is_finite() || !segment.end.is_finite() {
        warn!(chunk = chunk_index, ?segment, "Dropping segment with non-finite times");
        return false;
    }
    if segment.start < 0.0 || segment.end <= segment.start {
        warn!(chunk = chunk_index, ?segment, "Dropping segment with invalid time bounds");
        return false;
    }
    if segment.text.trim().is_empty() {
        return false;
    }
    true
}

fn duration(segment: &TranscriptSegment) -> f64 {
    segment.end - segment.start
}

/// Whether the last segment before a chunk boundary and the first one after
/// it are the same words transcribed twice.
fn is_boundary_duplicate(
    prev: &TranscriptSegment,
    next: &TranscriptSegment,
    config: &PipelineConfig,
) -> bool {
    let gap = (next.start - prev.end).max(0.0);
    if gap >= config.boundary_gap_secs {
        return false;
    }

    let a = normalize_text(&prev.text);
    let b = normalize_text(&next.text);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    if a == b {
        return true;
    }

    // Compare in characters throughout; byte lengths disagree with character
    // counts on non-ASCII text.
    let a_chars = a.chars().count();
    let b_chars = b.chars().count();
    let (short, long) = if a_chars <= b_chars { (&a, &b) } else { (&b, &a) };
    let ratio = a_chars.min(b_chars) as f64 / a_chars.max(b_chars) as f64;
    ratio >= config.boundary_similarity
        && (long.starts_with(short.as_str()) || long.ends_with(short.as_str()))
}

/// Lowercases, strips punctuation and collapses whitespace, so the duplicate
/// check compares words rather than the service's formatting choices.
fn normalize_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::waveform_secs;
    use crate::audio::{UploadLimits, split_chunks};

    fn chunks_of(total_secs: f64, chunk_secs: f64) -> Vec<AudioChunk> {
        let waveform = waveform_secs(total_secs, 0.1);
        let limits = UploadLimits {
            max_upload_bytes: u64::MAX,
            max_chunk_secs: chunk_secs,
        };
        split_chunks(&waveform, &limits, 1.0).unwrap()
    }

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn transcript(segments: Vec<TranscriptSegment>) -> ChunkTranscript {
        ChunkTranscript {
            segments,
            detected_duration_secs: None,
            language: None,
        }
    }

    #[test]
    fn offsets_rebase_chunk_local_times() {
        let chunks = chunks_of(40.0, 20.0);
        let transcripts = vec![
            transcript(vec![seg(0.0, 18.0, "hello")]),
            transcript(vec![seg(0.0, 20.0, "world")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(
            merged.segments,
            vec![seg(0.0, 18.0, "hello"), seg(20.0, 40.0, "world")]
        );
    }

    #[test]
    fn boundary_duplicate_collapses_to_the_tighter_segment() {
        let chunks = chunks_of(42.0, 21.0);
        let transcripts = vec![
            transcript(vec![
                seg(0.0, 15.0, "earlier speech"),
                seg(18.0, 21.0, "...end of sentence"),
            ]),
            // Chunk-local 0.1..1.0 lands at 21.1..22.0 globally: a 0.1s gap.
            transcript(vec![seg(0.1, 1.0, "end of sentence continued")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(
            merged.segments,
            vec![
                seg(0.0, 15.0, "earlier speech"),
                seg(21.1, 22.0, "end of sentence continued"),
            ]
        );
    }

    #[test]
    fn equal_text_keeps_the_tighter_bound() {
        let chunks = chunks_of(20.0, 10.0);
        let transcripts = vec![
            transcript(vec![seg(8.0, 10.0, "See you next week.")]),
            transcript(vec![seg(0.0, 0.8, "see you next week")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(merged.segments, vec![seg(10.0, 10.8, "see you next week")]);
    }

    #[test]
    fn boundary_duplicate_detection_counts_chars_not_bytes() {
        // Accented text, where byte lengths disagree with character counts:
        // "cómo te sientes" is 15 chars of the 21-char successor, ratio 0.71.
        let chunks = chunks_of(20.0, 10.0);
        let transcripts = vec![
            transcript(vec![seg(8.0, 10.0, "¿Cómo te sientes?")]),
            transcript(vec![seg(0.1, 1.2, "cómo te sientes ahora")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(
            merged.segments,
            vec![seg(10.1, 11.2, "cómo te sientes ahora")]
        );
    }

    #[test]
    fn similar_text_far_from_the_boundary_is_kept() {
        let chunks = chunks_of(20.0, 10.0);
        let transcripts = vec![
            transcript(vec![seg(5.0, 7.0, "right")]),
            // 3s gap to the previous segment: not a boundary artifact.
            transcript(vec![seg(0.0, 1.0, "right")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(merged.segments.len(), 2);
    }

    #[test]
    fn dissimilar_text_at_the_boundary_is_kept() {
        let chunks = chunks_of(20.0, 10.0);
        let transcripts = vec![
            transcript(vec![seg(9.0, 10.0, "how did that feel")]),
            transcript(vec![seg(0.1, 1.0, "it was hard to say")]),
        ];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(merged.segments.len(), 2);
    }

    #[test]
    fn segments_are_sorted_by_start() {
        let chunks = chunks_of(10.0, 20.0);
        let transcripts = vec![transcript(vec![
            seg(4.0, 6.0, "second"),
            seg(0.0, 2.0, "first"),
        ])];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        let texts: Vec<&str> = merged.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
    }

    #[test]
    fn invalid_service_output_is_dropped() {
        let chunks = chunks_of(10.0, 20.0);
        let transcripts = vec![transcript(vec![
            seg(2.0, 1.0, "inverted"),
            seg(-0.5, 1.0, "negative"),
            seg(1.0, 2.0, "   "),
            seg(f64::NAN, 2.0, "nan"),
            seg(3.0, 4.0, "kept"),
        ])];

        let merged = merge_chunk_transcripts(&chunks, &transcripts, &PipelineConfig::default());

        assert_eq!(merged.segments, vec![seg(3.0, 4.0, "kept")]);
    }

    #[test]
    fn language_comes_from_the_first_chunk_that_reports_one() {
        let chunks = chunks_of(40.0, 20.0);
        let mut first = transcript(vec![seg(0.0, 1.0, "a")]);
        first.language = None;
        let mut second = transcript(vec![seg(0.0, 1.0, "b")]);
        second.language = Some("de".to_string());

        let merged =
            merge_chunk_transcripts(&chunks, &[first, second], &PipelineConfig::default());

        assert_eq!(merged.language.as_deref(), Some("de"));
    }
}
