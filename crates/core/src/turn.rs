//! Turn records
//!
//! A `Turn` is one capture→respond cycle. The turn executor creates the
//! record at turn start and the record is immutable once appended to a
//! session's conversation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audio::AudioRef;
use crate::language::DetectedLanguage;

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// Full cycle ran; audio was handed to playback
    Completed,
    /// No speech before the capture ceiling; nothing was synthesized
    CaptureTimeout,
    /// Transcription errored or produced an unusable transcript
    TranscriptionFailed,
    /// Generation errored; the fallback phrase was spoken instead
    GenerationFailed,
    /// The synthesis fallback chain was exhausted; no audio played
    SynthesisFailed,
    /// The session's cancellation token fired mid-turn
    Cancelled,
}

impl TurnOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnOutcome::Completed => "completed",
            TurnOutcome::CaptureTimeout => "capture_timeout",
            TurnOutcome::TranscriptionFailed => "transcription_failed",
            TurnOutcome::GenerationFailed => "generation_failed",
            TurnOutcome::SynthesisFailed => "synthesis_failed",
            TurnOutcome::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transcript produced by the transcription capability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Transcript {
    pub text: String,
    /// Confidence in `[0.0, 1.0]`; engines without scores report 1.0
    pub confidence: f32,
}

impl Transcript {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// One capture/respond cycle within a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Monotonic within the session, starting at 0
    pub turn_index: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_audio: Option<AudioRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
    pub detected_language: DetectedLanguage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesized_audio: Option<AudioRef>,
    /// Name of the provider that produced the audio, when synthesis ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_provider: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: TurnOutcome,
}

impl Turn {
    /// Start a new turn record.
    ///
    /// A turn that never reaches [`Turn::finish`] reads as cancelled, which
    /// is exactly what an abandoned partial record is.
    pub fn begin(turn_index: u64) -> Self {
        Self {
            turn_index,
            captured_audio: None,
            transcript: None,
            detected_language: DetectedLanguage::Unknown,
            response_text: None,
            synthesized_audio: None,
            synthesis_provider: None,
            started_at: Utc::now(),
            completed_at: None,
            outcome: TurnOutcome::Cancelled,
        }
    }

    /// Seal the record with its outcome and completion time
    pub fn finish(mut self, outcome: TurnOutcome) -> Self {
        self.outcome = outcome;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Wall-clock duration, when the turn has finished
    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|done| (done - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_bare() {
        let turn = Turn::begin(3);
        assert_eq!(turn.turn_index, 3);
        assert!(turn.transcript.is_none());
        assert!(turn.completed_at.is_none());
        assert_eq!(turn.detected_language, DetectedLanguage::Unknown);
    }

    #[test]
    fn test_finish_seals_outcome() {
        let turn = Turn::begin(0).finish(TurnOutcome::Completed);
        assert_eq!(turn.outcome, TurnOutcome::Completed);
        assert!(turn.completed_at.is_some());
        assert!(turn.duration_ms().is_some());
    }

    #[test]
    fn test_serializes_without_empty_fields() {
        let json = serde_json::to_string(&Turn::begin(0)).unwrap();
        assert!(!json.contains("transcript"));
        assert!(!json.contains("response_text"));
        assert!(json.contains("\"outcome\":\"cancelled\""));
    }
}
