use std::ops::Range;

use tracing::warn;

/// Result of the silence scan. `skipped` carries the reason when the guard
/// decided to leave the waveform untouched.
pub(crate) struct TrimOutcome {
    pub range: Range<usize>,
    pub skipped: Option<String>,
}

/// Finds the sample range that survives leading/trailing silence removal.
///
/// The threshold is relative to the clip's own peak, so quiet recordings are
/// not eaten whole. If trimming would remove more than `max_fraction` of the
/// clip (or the clip is digital silence), the full range is kept and the
/// reason is reported for the run artifact.
pub(crate) fn trim_silence(samples: &[f32], threshold_db: f32, max_fraction: f64) -> TrimOutcome {
    let full = 0..samples.len();

    let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    if peak == 0.0 {
        warn!("Clip is digital silence, keeping it as-is");
        return TrimOutcome {
            range: full,
            skipped: Some("clip is digital silence".to_string()),
        };
    }

    let threshold = peak * 10.0f32.powf(threshold_db / 20.0);
    // The peak itself always clears a negative-dB threshold, so both finds hit.
    let start = samples
        .iter()
        .position(|s| s.abs() >= threshold)
        .unwrap_or(0);
    let end = samples
        .iter()
        .rposition(|s| s.abs() >= threshold)
        .map(|i| i + 1)
        .unwrap_or(samples.len());

    let kept = end - start;
    let fraction = 1.0 - kept as f64 / samples.len() as f64;
    if fraction > max_fraction {
        let reason = format!(
            "would remove {:.1}% of the clip (limit {:.1}%)",
            fraction * 100.0,
            max_fraction * 100.0
        );
        warn!(%reason, "Silence trim skipped");
        return TrimOutcome {
            range: full,
            skipped: Some(reason),
        };
    }

    TrimOutcome {
        range: start..end,
        skipped: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_silent_edges() {
        let mut samples = vec![0.0f32; 100];
        samples.extend(vec![0.8f32; 300]);
        samples.extend(vec![0.0f32; 100]);

        let out = trim_silence(&samples, -40.0, 0.9);

        assert_eq!(out.range, 100..400);
        assert!(out.skipped.is_none());
    }

    #[test]
    fn threshold_tracks_the_clip_peak() {
        // A quiet clip: peak 0.01. An absolute threshold would wipe it out,
        // a peak-relative one keeps the voiced middle.
        let mut samples = vec![0.000001f32; 50];
        samples.extend(vec![0.01f32; 200]);
        samples.extend(vec![0.000001f32; 50]);

        let out = trim_silence(&samples, -40.0, 0.9);

        assert_eq!(out.range, 50..250);
    }

    #[test]
    fn digital_silence_is_kept_with_a_reason() {
        let samples = vec![0.0f32; 500];

        let out = trim_silence(&samples, -40.0, 0.9);

        assert_eq!(out.range, 0..500);
        assert_eq!(out.skipped.as_deref(), Some("clip is digital silence"));
    }

    #[test]
    fn guard_refuses_to_remove_almost_everything() {
        let mut samples = vec![0.0f32; 10_000];
        samples[5_000] = 0.9;

        let out = trim_silence(&samples, -40.0, 0.9);

        assert_eq!(out.range, 0..10_000);
        assert!(out.skipped.unwrap().contains("would remove"));
    }

    #[test]
    fn interior_silence_is_untouched() {
        let mut samples = vec![0.7f32; 100];
        samples.extend(vec![0.0f32; 300]);
        samples.extend(vec![0.7f32; 100]);

        let out = trim_silence(&samples, -40.0, 0.9);

        assert_eq!(out.range, 0..500);
    }
}
