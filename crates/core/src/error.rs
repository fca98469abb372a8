//! Error taxonomy for the call core
//!
//! Step-level turn failures are absorbed into `TurnOutcome` by the turn
//! executor and never surface here; this enum covers what callers of the
//! control surface and the capability seams can actually observe.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::call::CallState;

/// One provider's failure inside a synthesis fallback pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    /// Provider name from its descriptor
    pub provider: String,
    /// Human-readable reason (error text, timeout, empty audio)
    pub reason: String,
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

/// Core error type
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// An event not listed for the session's current state was rejected.
    /// The session is unaffected.
    #[error("event '{event}' is not valid in state '{state}'")]
    SessionState {
        state: CallState,
        event: &'static str,
    },

    /// No speech observed within the capture ceiling. Non-fatal.
    #[error("no speech within {0} ms")]
    CaptureTimeout(u64),

    /// The capture capability itself failed
    #[error("capture failed: {0}")]
    Capture(String),

    /// Transcription capability error or unusable transcript. Non-fatal.
    #[error("transcription failed: {0}")]
    Transcription(String),

    /// Generation capability error. Non-fatal; a local fallback phrase is
    /// substituted by the turn executor.
    #[error("generation failed: {0}")]
    Generation(String),

    /// A single synthesis provider failed
    #[error("synthesis provider '{provider}' failed: {reason}")]
    Synthesis { provider: String, reason: String },

    /// Every eligible provider in the fallback chain failed, in order
    #[error("all synthesis providers exhausted ({} failures)", .0.len())]
    AllProvidersExhausted(Vec<ProviderFailure>),

    /// Playback capability error. Logged, never changes a turn outcome.
    #[error("playback failed: {0}")]
    Playback(String),

    /// Recoverable signaling-layer error
    #[error("signaling error: {0}")]
    Signaling(String),

    /// Unrecoverable signaling failure; the session is forced to `ended`
    #[error("fatal signaling error: {0}")]
    SignalingFatal(String),

    /// Registry-level error (capacity, busy endpoint, unknown session)
    #[error("session error: {0}")]
    Session(String),

    /// The operation was cancelled by the session's cancellation token
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the workspace
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_message() {
        let err = Error::SessionState {
            state: CallState::Idle,
            event: "local_accept",
        };
        assert_eq!(
            err.to_string(),
            "event 'local_accept' is not valid in state 'idle'"
        );
    }

    #[test]
    fn test_exhausted_counts_failures() {
        let err = Error::AllProvidersExhausted(vec![
            ProviderFailure {
                provider: "azure".into(),
                reason: "timeout".into(),
            },
            ProviderFailure {
                provider: "gtts".into(),
                reason: "empty audio".into(),
            },
        ]);
        assert!(err.to_string().contains("2 failures"));
    }
}
