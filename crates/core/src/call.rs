//! Call lifecycle states and signaling events
//!
//! The transition table is a pure function so it can be tested by folding
//! event sequences; the session machinery owns the side effects.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Unique token identifying one call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signaling endpoint (extension, URI, or carrier address)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(String);

impl Endpoint {
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Endpoint {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Call session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Not yet signaled
    #[default]
    Idle,
    /// Outbound signaling sent, awaiting peer accept
    Dialing,
    /// Inbound signaling received, awaiting local accept
    Ringing,
    /// Media path established, turns may run
    Active,
    /// End requested, draining any in-flight turn
    Terminating,
    /// Terminal; the session is evictable
    Ended,
}

impl CallState {
    /// Terminal state check
    pub fn is_ended(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    /// States that count toward the one-active-session-per-endpoint rule
    pub fn is_live(&self) -> bool {
        !self.is_ended()
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CallState::Idle => "idle",
            CallState::Dialing => "dialing",
            CallState::Ringing => "ringing",
            CallState::Active => "active",
            CallState::Terminating => "terminating",
            CallState::Ended => "ended",
        };
        write!(f, "{s}")
    }
}

/// Who asked for the call to end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HangupOrigin {
    Local,
    Peer,
}

/// Events accepted by the call state machine.
///
/// Signaling-layer events arrive through the session registry; command
/// events (`Initiate`, `LocalAccept`, `LocalReject`, `HangupRequested` with
/// local origin) come from the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Place an outbound call to `target`
    Initiate { target: Endpoint },
    /// Inbound signaling from `peer`
    InboundSignal { peer: Endpoint },
    /// The dialed peer accepted
    PeerAccepted,
    /// The dialed peer rejected
    PeerRejected,
    /// No answer before the dialing ceiling
    DialTimeout,
    /// Local side accepts a ringing call
    LocalAccept,
    /// Local side rejects a ringing call
    LocalReject,
    /// The ringing peer gave up before we answered
    PeerCancelled,
    /// End of call requested
    HangupRequested { origin: HangupOrigin },
    /// Media/signaling path to the peer was lost
    PeerDropped,
    /// The in-flight turn (if any) has drained after a hangup
    DrainComplete,
    /// Unrecoverable signaling failure; forces the session down
    FatalSignalingError { reason: String },
}

impl SessionEvent {
    /// Short name for diagnostics and rejection errors
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Initiate { .. } => "initiate",
            SessionEvent::InboundSignal { .. } => "inbound_signal",
            SessionEvent::PeerAccepted => "peer_accepted",
            SessionEvent::PeerRejected => "peer_rejected",
            SessionEvent::DialTimeout => "dial_timeout",
            SessionEvent::LocalAccept => "local_accept",
            SessionEvent::LocalReject => "local_reject",
            SessionEvent::PeerCancelled => "peer_cancelled",
            SessionEvent::HangupRequested { .. } => "hangup_requested",
            SessionEvent::PeerDropped => "peer_dropped",
            SessionEvent::DrainComplete => "drain_complete",
            SessionEvent::FatalSignalingError { .. } => "fatal_signaling_error",
        }
    }
}

impl CallState {
    /// Apply one event to the current state.
    ///
    /// Returns the next state, or [`Error::SessionState`] when the event is
    /// not listed for the current state. Rejected events never change state.
    pub fn apply(self, event: &SessionEvent) -> Result<CallState> {
        use CallState::*;
        use SessionEvent::*;

        // Fatal signaling errors are accepted in every state.
        if matches!(event, FatalSignalingError { .. }) {
            return Ok(Ended);
        }

        let next = match (self, event) {
            (Idle, Initiate { .. }) => Dialing,
            (Idle, InboundSignal { .. }) => Ringing,
            (Dialing, PeerAccepted) => Active,
            (Dialing, PeerRejected) | (Dialing, DialTimeout) => Ended,
            (Ringing, LocalAccept) => Active,
            (Ringing, LocalReject) | (Ringing, PeerCancelled) => Ended,
            (Active, HangupRequested { .. }) | (Active, PeerDropped) => Terminating,
            (Terminating, DrainComplete) => Ended,
            (state, event) => {
                return Err(Error::SessionState {
                    state,
                    event: event.name(),
                })
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(events: &[SessionEvent]) -> Result<CallState> {
        events
            .iter()
            .try_fold(CallState::Idle, |state, ev| state.apply(ev))
    }

    #[test]
    fn test_outbound_happy_path() {
        let state = fold(&[
            SessionEvent::Initiate {
                target: "1002".into(),
            },
            SessionEvent::PeerAccepted,
            SessionEvent::HangupRequested {
                origin: HangupOrigin::Local,
            },
            SessionEvent::DrainComplete,
        ])
        .unwrap();
        assert_eq!(state, CallState::Ended);
    }

    #[test]
    fn test_inbound_happy_path() {
        let state = fold(&[
            SessionEvent::InboundSignal {
                peer: "1001".into(),
            },
            SessionEvent::LocalAccept,
            SessionEvent::PeerDropped,
            SessionEvent::DrainComplete,
        ])
        .unwrap();
        assert_eq!(state, CallState::Ended);
    }

    #[test]
    fn test_rejected_dial() {
        assert_eq!(
            fold(&[
                SessionEvent::Initiate {
                    target: "1002".into()
                },
                SessionEvent::PeerRejected,
            ])
            .unwrap(),
            CallState::Ended
        );
        assert_eq!(
            fold(&[
                SessionEvent::Initiate {
                    target: "1002".into()
                },
                SessionEvent::DialTimeout,
            ])
            .unwrap(),
            CallState::Ended
        );
    }

    #[test]
    fn test_invalid_event_is_rejected() {
        let err = CallState::Idle.apply(&SessionEvent::LocalAccept).unwrap_err();
        match err {
            Error::SessionState { state, event } => {
                assert_eq!(state, CallState::Idle);
                assert_eq!(event, "local_accept");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_event_does_not_change_state() {
        let state = CallState::Ringing;
        assert!(state.apply(&SessionEvent::PeerAccepted).is_err());
        // `apply` is by-value and pure; the caller keeps the old state.
        assert_eq!(state, CallState::Ringing);
    }

    #[test]
    fn test_fatal_error_from_any_state() {
        let fatal = SessionEvent::FatalSignalingError {
            reason: "transport lost".into(),
        };
        for state in [
            CallState::Idle,
            CallState::Dialing,
            CallState::Ringing,
            CallState::Active,
            CallState::Terminating,
            CallState::Ended,
        ] {
            assert_eq!(state.apply(&fatal).unwrap(), CallState::Ended);
        }
    }

    #[test]
    fn test_ended_is_terminal() {
        for event in [
            SessionEvent::PeerAccepted,
            SessionEvent::LocalAccept,
            SessionEvent::DrainComplete,
            SessionEvent::HangupRequested {
                origin: HangupOrigin::Peer,
            },
        ] {
            assert!(CallState::Ended.apply(&event).is_err());
        }
    }

    #[test]
    fn test_no_turns_before_active() {
        // Dialing accepts neither hangup-drain nor accept-side events meant
        // for other states.
        assert!(CallState::Dialing
            .apply(&SessionEvent::DrainComplete)
            .is_err());
        assert!(CallState::Dialing.apply(&SessionEvent::LocalAccept).is_err());
    }
}
