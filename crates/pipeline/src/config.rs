use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::RetryConfig;

/// Configuration for the session transcript pipeline.
///
/// Everything here has a sensible default; a deployment normally only
/// overrides service endpoints (which live with the backends, not here)
/// and maybe the concurrency caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Language hint forwarded to the transcription service (e.g. "en").
    /// None = let the service auto-detect.
    pub language: Option<String>,
    /// Expected speaker count forwarded to the diarization service.
    /// Therapy sessions are two-party, so the default is 2.
    pub expected_speakers: Option<u32>,
    /// Silence trim threshold in dB relative to the clip's peak amplitude.
    pub trim_threshold_db: f32,
    /// Trimming is skipped (with a warning) if it would remove more than
    /// this fraction of the clip.
    pub trim_max_fraction: f64,
    /// Chunks shorter than this are merged into their neighbour.
    pub min_chunk_secs: f64,
    /// Maximum time gap between two boundary segments for them to be
    /// considered re-transcribed duplicates.
    pub boundary_gap_secs: f64,
    /// Minimum normalized-text length ratio for a prefix/suffix pair of
    /// boundary segments to count as duplicates.
    pub boundary_similarity: f64,
    /// Minimum fraction of a segment's duration that its best turn must
    /// cover for the speaker to be assigned.
    pub min_overlap_ratio: f64,
    /// Maximum in-flight chunk transcription requests per run.
    pub max_inflight_chunks: usize,
    /// Process-wide cap on concurrent outbound service requests.
    pub max_outbound_requests: usize,
    /// Maximum pipeline runs processed concurrently by the engine.
    pub max_concurrent_runs: usize,
    /// Timeout for a single service call, in seconds.
    pub request_timeout_secs: u64,
    /// Attempts per chunk request before the run fails.
    pub retry_max_attempts: u32,
    /// First retry delay in milliseconds; doubles per attempt.
    pub retry_initial_backoff_ms: u64,
    /// Ceiling for the retry delay in milliseconds.
    pub retry_max_backoff_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: None,
            expected_speakers: Some(2),
            trim_threshold_db: -40.0,
            trim_max_fraction: 0.9,
            min_chunk_secs: 1.0,
            boundary_gap_secs: 0.5,
            boundary_similarity: 0.6,
            min_overlap_ratio: 0.5,
            max_inflight_chunks: 4,
            max_outbound_requests: 8,
            max_concurrent_runs: 4,
            request_timeout_secs: 120,
            retry_max_attempts: 3,
            retry_initial_backoff_ms: 500,
            retry_max_backoff_ms: 8_000,
        }
    }
}

impl PipelineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
        }
    }
}
