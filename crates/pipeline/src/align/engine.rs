//! Maximum-overlap speaker attribution.
//!
//! For every transcript segment, find the speaker turn covering the largest
//! share of that segment's own duration. Turns are usually much longer than
//! segments, so the ratio is against the segment, not the turn; a half-covered
//! segment is the least we accept as evidence.

use tracing::{debug, info};

use super::AlignedSegment;
use crate::asr::TranscriptSegment;
use crate::diarization::SpeakerTurn;
use crate::error::PipelineError;

/// Assigns a speaker to every segment by maximal temporal overlap.
///
/// Both inputs must be sorted by start time, which upstream construction
/// guarantees; violations mean corrupted data and abort the run. Instead of
/// scoring every turn against every segment, a cursor walks the turn list
/// alongside the segments, so each segment only scores the turns that can
/// still overlap it. Ties on overlap go to the turn that starts earlier.
pub fn align_segments(
    segments: &[TranscriptSegment],
    turns: &[SpeakerTurn],
    min_overlap_ratio: f64,
) -> Result<Vec<AlignedSegment>, PipelineError> {
    validate_segments(segments)?;
    validate_turns(turns)?;

    let mut aligned = Vec::with_capacity(segments.len());
    let mut base = 0usize;

    for segment in segments {
        // Turns that end at or before this segment's start can never overlap
        // this segment or any later one.
        while base < turns.len() && turns[base].end <= segment.start {
            base += 1;
        }

        let mut best: Option<(&SpeakerTurn, f64)> = None;
        let mut j = base;
        while j < turns.len() && turns[j].start < segment.end {
            let turn = &turns[j];
            let overlap = (segment.end.min(turn.end) - segment.start.max(turn.start)).max(0.0);
            if best.map_or(true, |(_, best_overlap)| overlap > best_overlap) {
                best = Some((turn, overlap));
            }
            j += 1;
        }

        let duration = segment.end - segment.start;
        let (speaker, overlap_ratio) = match best {
            Some((turn, overlap)) if duration > 0.0 => {
                let ratio = overlap / duration;
                if ratio >= min_overlap_ratio {
                    (Some(turn.speaker), ratio)
                } else {
                    debug!(
                        start = segment.start,
                        end = segment.end,
                        ratio,
                        "No turn covers enough of segment"
                    );
                    (None, ratio)
                }
            }
            _ => (None, 0.0),
        };

        aligned.push(AlignedSegment {
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            speaker,
            overlap_ratio,
        });
    }

    let unknown = aligned.iter().filter(|s| s.speaker.is_none()).count();
    info!(
        segments = aligned.len(),
        unknown,
        turns = turns.len(),
        "Speaker alignment complete"
    );
    Ok(aligned)
}

fn validate_segments(segments: &[TranscriptSegment]) -> Result<(), PipelineError> {
    let mut prev_start = f64::NEG_INFINITY;
    for segment in segments {
        if !segment.start.is_finite()
            || !segment.end.is_finite()
            || segment.start < 0.0
            || segment.end < segment.start
        {
            return Err(PipelineError::Alignment {
                detail: format!("segment has corrupt time bounds: {segment:?}"),
            });
        }
        if segment.start < prev_start {
            return Err(PipelineError::Alignment {
                detail: format!("segments out of order at start {}", segment.start),
            });
        }
        prev_start = segment.start;
    }
    Ok(())
}

fn validate_turns(turns: &[SpeakerTurn]) -> Result<(), PipelineError> {
    let mut prev_start = f64::NEG_INFINITY;
    for turn in turns {
        if !turn.start.is_finite()
            || !turn.end.is_finite()
            || turn.start < 0.0
            || turn.end <= turn.start
        {
            return Err(PipelineError::Alignment {
                detail: format!("speaker turn has corrupt time bounds: {turn:?}"),
            });
        }
        if turn.start < prev_start {
            return Err(PipelineError::Alignment {
                detail: format!("speaker turns out of order at start {}", turn.start),
            });
        }
        prev_start = turn.start;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diarization::SpeakerId;

    fn seg(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn turn(speaker: u32, start: f64, end: f64) -> SpeakerTurn {
        SpeakerTurn {
            speaker: SpeakerId(speaker),
            start,
            end,
        }
    }

    #[test]
    fn contained_segment_gets_the_turn_with_ratio_one() {
        let segments = [seg(2.0, 4.0, "hello")];
        let turns = [turn(0, 0.0, 10.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, Some(SpeakerId(0)));
        assert_eq!(aligned[0].overlap_ratio, 1.0);
    }

    #[test]
    fn no_turns_means_every_segment_is_unknown() {
        let segments = [seg(0.0, 2.0, "a"), seg(2.0, 4.0, "b")];

        let aligned = align_segments(&segments, &[], 0.5).unwrap();

        for s in &aligned {
            assert_eq!(s.speaker, None);
            assert_eq!(s.overlap_ratio, 0.0);
        }
    }

    #[test]
    fn dominant_turn_under_half_yields_unknown_with_ratio() {
        // 30% / 20% coverage of a 10s segment: nothing clears the bar.
        let segments = [seg(0.0, 10.0, "long rambling segment")];
        let turns = [turn(0, 0.0, 3.0), turn(1, 3.0, 5.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, None);
        assert!((aligned[0].overlap_ratio - 0.3).abs() < 1e-12);
    }

    #[test]
    fn exactly_half_coverage_is_assigned() {
        let segments = [seg(0.0, 4.0, "borderline")];
        let turns = [turn(3, 0.0, 2.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, Some(SpeakerId(3)));
        assert_eq!(aligned[0].overlap_ratio, 0.5);
    }

    #[test]
    fn equal_overlap_goes_to_the_earlier_turn() {
        // Both turns cover exactly 2s of the segment.
        let segments = [seg(2.0, 6.0, "tie")];
        let turns = [turn(0, 0.0, 4.0), turn(1, 4.0, 8.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, Some(SpeakerId(0)));
        assert_eq!(aligned[0].overlap_ratio, 0.5);
    }

    #[test]
    fn zero_duration_segment_does_not_divide_by_zero() {
        let segments = [seg(3.0, 3.0, "uh")];
        let turns = [turn(0, 0.0, 10.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, None);
        assert_eq!(aligned[0].overlap_ratio, 0.0);
    }

    #[test]
    fn each_segment_finds_its_own_best_turn() {
        let segments = [seg(0.0, 2.0, "a"), seg(2.0, 4.0, "b"), seg(4.0, 6.0, "c")];
        let turns = [turn(0, 0.0, 3.1), turn(1, 3.1, 6.0)];

        let aligned = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(aligned[0].speaker, Some(SpeakerId(0)));
        assert_eq!(aligned[1].speaker, Some(SpeakerId(0)));
        assert!((aligned[1].overlap_ratio - 0.55).abs() < 1e-12);
        assert_eq!(aligned[2].speaker, Some(SpeakerId(1)));
        assert_eq!(aligned[2].overlap_ratio, 1.0);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let segments = [
            seg(0.0, 1.5, "one"),
            seg(1.5, 3.7, "two"),
            seg(3.7, 9.2, "three"),
        ];
        let turns = [turn(0, 0.0, 2.0), turn(1, 2.0, 5.0), turn(0, 5.0, 9.0)];

        let first = align_segments(&segments, &turns, 0.5).unwrap();
        let second = align_segments(&segments, &turns, 0.5).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn corrupt_segment_bounds_are_an_alignment_error() {
        let segments = [seg(f64::NAN, 2.0, "nan")];

        let err = align_segments(&segments, &[], 0.5).unwrap_err();

        assert!(matches!(err, PipelineError::Alignment { .. }));
    }

    #[test]
    fn out_of_order_segments_are_an_alignment_error() {
        let segments = [seg(5.0, 6.0, "late"), seg(0.0, 1.0, "early")];

        let err = align_segments(&segments, &[], 0.5).unwrap_err();

        assert!(matches!(err, PipelineError::Alignment { .. }));
    }

    #[test]
    fn inverted_turn_bounds_are_an_alignment_error() {
        let segments = [seg(0.0, 1.0, "a")];
        let turns = [turn(0, 4.0, 2.0)];

        let err = align_segments(&segments, &turns, 0.5).unwrap_err();

        assert!(matches!(err, PipelineError::Alignment { .. }));
    }
}
