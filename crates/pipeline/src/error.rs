//! Error types for the session transcript pipeline.
//!
//! The taxonomy distinguishes errors that are worth retrying a whole run for
//! (the service was briefly unavailable) from errors that are not (the audio
//! is corrupt, or an internal invariant broke). Diarization failures never
//! appear here: the pipeline degrades to unknown speakers instead of failing.

use thiserror::Error;

/// Fatal audio ingestion errors. None of these are retryable.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("unsupported audio container (expected RIFF/WAV)")]
    UnsupportedFormat,

    #[error("wav decode failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("audio stream is empty")]
    Empty,

    #[error("unsupported channel layout: {channels} channels")]
    InvalidChannels { channels: u16 },

    #[error("resample failed: {message}")]
    Resample { message: String },
}

/// Errors from the transcription service boundary.
///
/// `is_transient` drives both the local retry loop and the caller-facing
/// "is a whole-run retry likely to help" answer.
#[derive(Debug, Error)]
pub enum AsrError {
    #[error("rate limited by transcription service")]
    RateLimited,

    #[error("transcription request timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("transport error talking to transcription service: {message}")]
    Transport { message: String },

    #[error("transcription service rejected the audio as malformed: {message}")]
    MalformedAudio { message: String },

    #[error("transcription service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected transcription response: {message}")]
    InvalidResponse { message: String },

    #[error("transcription failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AsrError>,
    },
}

impl AsrError {
    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::MalformedAudio { .. } | Self::Rejected { .. } | Self::InvalidResponse { .. } => {
                false
            }
            // The retry loop only re-attempts transient errors, so an
            // exhausted loop still points at a service-side problem.
            Self::RetriesExhausted { .. } => true,
        }
    }
}

/// Union of everything a pipeline run can fail with.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error("chunking invariant violated: {detail}")]
    ChunkingInvariant { detail: String },

    #[error(transparent)]
    Transcription(#[from] AsrError),

    #[error("alignment received corrupt input: {detail}")]
    Alignment { detail: String },

    #[error("pipeline task failed: {detail}")]
    TaskFailed { detail: String },

    #[error("run was cancelled")]
    Cancelled,
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transcription(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Attaches the stage a failure surfaced in.
    pub fn at(self, stage: Stage) -> RunError {
        RunError {
            stage,
            source: self,
        }
    }
}

/// Pipeline stages, used for failure attribution and state reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Normalize,
    Chunk,
    Transcribe,
    Diarize,
    Align,
    Label,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normalize => "normalize",
            Self::Chunk => "chunk",
            Self::Transcribe => "transcribe",
            Self::Diarize => "diarize",
            Self::Align => "align",
            Self::Label => "label",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed run: which stage, and what went wrong.
#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct RunError {
    pub stage: Stage,
    #[source]
    pub source: PipelineError,
}

impl RunError {
    /// Whether re-submitting the whole run is likely to help.
    ///
    /// `true` means "the service was briefly unavailable", `false` means
    /// "your audio is corrupt" (or an internal bug).
    pub fn is_transient(&self) -> bool {
        self.source.is_transient()
    }
}
