//! Role labeling: which session speaker is the interviewer, which the subject.
//!
//! The rule is a replaceable policy behind [`RoleStrategy`]; the rest of the
//! pipeline only consumes the resulting assignment.

use std::collections::HashMap;

use tracing::{debug, info};

use super::AlignedSegment;
use crate::diarization::SpeakerId;

/// Semantic role of a session speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Interviewer,
    Subject,
    Unassigned,
}

impl Role {
    /// Artifact representation; `Unassigned` serializes as null.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Role::Interviewer => Some("interviewer"),
            Role::Subject => Some("subject"),
            Role::Unassigned => None,
        }
    }
}

/// Total mapping from every speaker seen in the session to a role.
pub type RoleAssignment = HashMap<SpeakerId, Role>;

/// Strategy for deciding which speaker plays which role.
pub trait RoleStrategy: Send + Sync {
    /// Assigns a role to every speaker appearing in `segments`.
    ///
    /// Must be deterministic for a given segment sequence and total: every
    /// speaker id present gets exactly one role.
    fn assign(&self, segments: &[AlignedSegment]) -> RoleAssignment;

    /// Human-readable policy name.
    fn name(&self) -> &str;
}

/// Words that open a question when a transcription drops the question mark.
const QUESTION_OPENERS: &[&str] = &[
    "who", "what", "when", "where", "why", "how", "do", "does", "did", "are", "is", "was", "were",
    "can", "could", "will", "would", "have", "has", "tell",
];

/// Default policy: the speaker who asks more question-like utterances is the
/// interviewer; on a tie, the one who speaks first.
///
/// Two-party sessions get a full binary mapping. With more detected
/// speakers, the two who speak the most get the roles and the rest stay
/// `Unassigned`; a lone speaker is treated as the subject.
#[derive(Debug, Default)]
pub struct QuestionLeadPolicy;

#[derive(Debug, Default)]
struct SpeakerStats {
    segments: u32,
    questions: u32,
    first_start: f64,
}

impl RoleStrategy for QuestionLeadPolicy {
    fn assign(&self, segments: &[AlignedSegment]) -> RoleAssignment {
        let mut stats: HashMap<SpeakerId, SpeakerStats> = HashMap::new();
        for segment in segments {
            let Some(speaker) = segment.speaker else {
                continue;
            };
            let entry = stats.entry(speaker).or_insert_with(|| SpeakerStats {
                first_start: segment.start,
                ..SpeakerStats::default()
            });
            entry.segments += 1;
            if is_question(&segment.text) {
                entry.questions += 1;
            }
            // Segments arrive sorted, so the first insert fixed first_start.
        }

        let mut speakers: Vec<(SpeakerId, SpeakerStats)> = stats.into_iter().collect();
        if speakers.is_empty() {
            return RoleAssignment::new();
        }
        if speakers.len() == 1 {
            info!(speaker = %speakers[0].0, "Single speaker session, labeling as subject");
            return RoleAssignment::from([(speakers[0].0, Role::Subject)]);
        }

        // The two most talkative speakers are the session's parties.
        speakers.sort_by(|a, b| b.1.segments.cmp(&a.1.segments).then(a.0.cmp(&b.0)));
        let mut assignment = RoleAssignment::new();
        for (speaker, _) in speakers.iter().skip(2) {
            debug!(speaker = %speaker, "Extra speaker left without a role");
            assignment.insert(*speaker, Role::Unassigned);
        }

        let (first, second) = (&speakers[0], &speakers[1]);
        let first_ratio = question_ratio(&first.1);
        let second_ratio = question_ratio(&second.1);
        let interviewer = if first_ratio > second_ratio {
            first.0
        } else if second_ratio > first_ratio {
            second.0
        } else if first.1.first_start <= second.1.first_start {
            first.0
        } else {
            second.0
        };
        let subject = if interviewer == first.0 {
            second.0
        } else {
            first.0
        };
        assignment.insert(interviewer, Role::Interviewer);
        assignment.insert(subject, Role::Subject);

        info!(
            interviewer = %interviewer,
            subject = %subject,
            speakers = assignment.len(),
            "Roles assigned"
        );
        assignment
    }

    fn name(&self) -> &str {
        "question_lead"
    }
}

fn question_ratio(stats: &SpeakerStats) -> f64 {
    if stats.segments == 0 {
        return 0.0;
    }
    stats.questions as f64 / stats.segments as f64
}

fn is_question(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    let first_word: String = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    QUESTION_OPENERS.contains(&first_word.as_str())
}
