//! Speaker alignment: joining the transcript against the diarization turns.

pub mod engine;
pub mod roles;

pub use engine::align_segments;
pub use roles::{QuestionLeadPolicy, Role, RoleAssignment, RoleStrategy};

use crate::diarization::SpeakerId;

/// A transcript segment with its speaker attribution.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    /// `None` when no turn covered enough of the segment.
    pub speaker: Option<SpeakerId>,
    /// Fraction of the segment's own duration covered by the winning turn.
    /// Recorded even when attribution failed, for diagnostics.
    pub overlap_ratio: f64,
}
