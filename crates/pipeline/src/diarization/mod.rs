//! Speaker diarization backends and the canonical turn model.
//!
//! Diarization always sees the full waveform (quality collapses when it is
//! run per chunk) and is treated as an enhancement: if the service fails,
//! the pipeline continues with no turns and every segment ends up unknown.

pub mod exclusive;
pub mod remote;

pub use exclusive::ExclusiveDiarizer;
pub use remote::{RemoteDiarizationBackend, RemoteDiarizationConfig};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::audio::Waveform;
use crate::retry::RetryConfig;

/// Session-local speaker identifier, assigned in order of first appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpeakerId(pub u32);

impl fmt::Display for SpeakerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "speaker_{}", self.0)
    }
}

/// A turn as a backend reported it, with the service's own speaker label.
#[derive(Debug, Clone)]
pub struct RawTurn {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

/// A span of speech attributed to one session-local speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerTurn {
    pub speaker: SpeakerId,
    pub start: f64,
    pub end: f64,
}

/// Trait for pluggable diarization backends.
#[async_trait]
pub trait DiarizationBackend: Send + Sync + 'static {
    /// Diarizes a full waveform into raw speaker turns.
    async fn diarize(
        &self,
        waveform: &Waveform,
        expected_speakers: Option<u32>,
    ) -> anyhow::Result<Vec<RawTurn>>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}

/// Outcome of the diarization branch. `degraded` carries the failure reason
/// when the turns are missing rather than genuinely empty.
#[derive(Debug, Clone)]
pub struct DiarizationOutcome {
    pub turns: Vec<SpeakerTurn>,
    pub degraded: Option<String>,
}

/// Runs diarization with timeout and bounded retries, degrading to an empty
/// turn list instead of failing the run.
///
/// Unlike transcription there is no transient/fatal split here: every
/// failure is worth one more try, and the last one only costs the speaker
/// labels, not the transcript.
pub async fn diarize_waveform(
    backend: Arc<dyn DiarizationBackend>,
    waveform: &Waveform,
    expected_speakers: Option<u32>,
    timeout: Duration,
    retry: &RetryConfig,
) -> DiarizationOutcome {
    let attempts = retry.max_attempts.max(1);
    let mut delay = retry.initial_backoff;

    let mut last_failure = String::new();
    for attempt in 1..=attempts {
        let result = tokio::time::timeout(
            timeout,
            backend.diarize(waveform, expected_speakers),
        )
        .await;
        match result {
            Ok(Ok(raw)) => {
                let turns = canonicalize_turns(raw);
                info!(
                    backend = backend.name(),
                    turns = turns.len(),
                    speakers = distinct_speakers(&turns),
                    "Diarization complete"
                );
                return DiarizationOutcome {
                    turns,
                    degraded: None,
                };
            }
            Ok(Err(e)) => last_failure = e.to_string(),
            Err(_) => last_failure = format!("timed out after {}s", timeout.as_secs()),
        }
        if attempt < attempts {
            warn!(
                backend = backend.name(),
                attempt,
                error = %last_failure,
                "Diarization attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(retry.max_backoff);
        }
    }

    warn!(
        backend = backend.name(),
        error = %last_failure,
        "Diarization failed, continuing without speaker turns"
    );
    DiarizationOutcome {
        turns: Vec::new(),
        degraded: Some(last_failure),
    }
}

/// Renames service speaker labels to `speaker_0`, `speaker_1`, … in order
/// of first appearance, dropping turns the data model cannot represent.
fn canonicalize_turns(mut raw: Vec<RawTurn>) -> Vec<SpeakerTurn> {
    raw.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

    let mut ids: HashMap<String, SpeakerId> = HashMap::new();
    let mut turns = Vec::with_capacity(raw.len());
    for turn in raw {
        if !turn.start.is_finite() || !turn.end.is_finite() || turn.start >= turn.end {
            warn!(?turn, "Dropping diarization turn with invalid time bounds");
            continue;
        }
        let next_id = SpeakerId(ids.len() as u32);
        let speaker = *ids.entry(turn.speaker).or_insert(next_id);
        turns.push(SpeakerTurn {
            speaker,
            start: turn.start,
            end: turn.end,
        });
    }
    turns
}

fn distinct_speakers(turns: &[SpeakerTurn]) -> usize {
    let mut seen: Vec<SpeakerId> = turns.iter().map(|t| t.speaker).collect();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}
