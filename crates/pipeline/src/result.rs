//! The artifact a completed run hands to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::align::{AlignedSegment, Role, RoleAssignment};
use crate::diarization::{SpeakerId, SpeakerTurn};

/// Artifact value for a segment no turn could claim.
const UNKNOWN_SPEAKER: &str = "UNKNOWN";

/// An aligned segment with its speaker's session role attached.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<SpeakerId>,
    pub overlap_ratio: f64,
    /// `None` when the speaker is unknown; `Some(Unassigned)` when the
    /// speaker is known but fell outside the two-party mapping.
    pub role: Option<Role>,
}

/// The complete output of one pipeline run. Constructed once, never
/// mutated; the caller owns it.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub segments: Vec<LabeledSegment>,
    pub speaker_turns: Vec<SpeakerTurn>,
    pub full_text: String,
    pub duration_secs: f64,
    pub language: Option<String>,
    /// Degradation markers collected along the way (skipped trim,
    /// diarization fallback).
    pub warnings: Vec<String>,
}

impl PipelineResult {
    /// Joins the aligned segments with the role assignment and derives the
    /// session-level fields.
    pub fn assemble(
        aligned: Vec<AlignedSegment>,
        roles: &RoleAssignment,
        speaker_turns: Vec<SpeakerTurn>,
        duration_secs: f64,
        language: Option<String>,
        warnings: Vec<String>,
    ) -> Self {
        let segments: Vec<LabeledSegment> = aligned
            .into_iter()
            .map(|s| LabeledSegment {
                role: s.speaker.and_then(|id| roles.get(&id).copied()),
                start: s.start,
                end: s.end,
                text: s.text,
                speaker: s.speaker,
                overlap_ratio: s.overlap_ratio,
            })
            .collect();

        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            segments,
            speaker_turns,
            full_text,
            duration_secs,
            language,
            warnings,
        }
    }

    /// Renders the downstream-facing artifact.
    pub fn to_artifact(&self) -> Artifact {
        Artifact {
            metadata: ArtifactMetadata {
                created_at: Utc::now(),
                duration: self.duration_secs,
                language: self.language.clone(),
                num_segments: self.segments.len(),
                num_speaker_turns: self.speaker_turns.len(),
                warnings: self.warnings.clone(),
            },
            speaker_turns: self
                .speaker_turns
                .iter()
                .map(|t| ArtifactTurn {
                    speaker: t.speaker.to_string(),
                    start: t.start,
                    end: t.end,
                })
                .collect(),
            segments: self
                .segments
                .iter()
                .map(|s| ArtifactSegment {
                    start: s.start,
                    end: s.end,
                    text: s.text.clone(),
                    speaker: s
                        .speaker
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string()),
                    role: s.role.and_then(|r| r.as_str()).map(str::to_string),
                })
                .collect(),
            full_text: self.full_text.clone(),
        }
    }
}

/// JSON boundary surface consumed by the downstream summarization and
/// storage collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub metadata: ArtifactMetadata,
    pub speaker_turns: Vec<ArtifactTurn>,
    pub segments: Vec<ArtifactSegment>,
    pub full_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// When this artifact was rendered.
    pub created_at: DateTime<Utc>,
    pub duration: f64,
    pub language: Option<String>,
    pub num_segments: usize,
    pub num_speaker_turns: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactTurn {
    pub speaker: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: String,
    pub role: Option<String>,
}
