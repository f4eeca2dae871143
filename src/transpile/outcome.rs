/*!
 * Result of translating a single segment.
 */

use serde::{Deserialize, Serialize};

use super::segmenter::SegmentId;

/// Terminal status of a segment translation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// Translated text
    Success(String),
    /// Reason of the last failed attempt
    Failed(String),
}

/// What a fan-out task reports back to the barrier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub segment_id: SegmentId,
    pub status: OutcomeStatus,
    /// Number of attempts made, including the successful one
    pub attempts: u32,
}

impl TranslationOutcome {
    pub fn success(segment_id: SegmentId, text: impl Into<String>, attempts: u32) -> Self {
        Self {
            segment_id,
            status: OutcomeStatus::Success(text.into()),
            attempts,
        }
    }

    pub fn failed(segment_id: SegmentId, reason: impl Into<String>, attempts: u32) -> Self {
        Self {
            segment_id,
            status: OutcomeStatus::Failed(reason.into()),
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success(_))
    }

    /// Failure reason, if the translation failed
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Failed(reason) => Some(reason),
            OutcomeStatus::Success(_) => None,
        }
    }
}
