pub mod align;
pub mod asr;
pub mod audio;
pub mod config;
pub mod diarization;
pub mod engine;
pub mod error;
pub mod result;
pub mod retry;
pub mod runner;

pub use align::{AlignedSegment, QuestionLeadPolicy, Role, RoleAssignment, RoleStrategy};
pub use asr::{AsrBackend, ChunkTranscript, RemoteAsrBackend, RemoteAsrConfig, TranscriptSegment};
pub use audio::{AudioChunk, UploadLimits, Waveform};
pub use config::PipelineConfig;
pub use diarization::{
    DiarizationBackend, ExclusiveDiarizer, RemoteDiarizationBackend, RemoteDiarizationConfig,
    SpeakerId, SpeakerTurn,
};
pub use engine::{PipelineEngine, RunHandle};
pub use error::{AsrError, AudioError, PipelineError, RunError, Stage};
pub use result::{Artifact, LabeledSegment, PipelineResult};
pub use runner::{PipelineRun, RunState};
