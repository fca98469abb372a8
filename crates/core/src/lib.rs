//! Core traits and types for the voice call bot
//!
//! This crate provides the foundational pieces used across the workspace:
//! - Capability traits for pluggable backends (capture, STT, generation,
//!   TTS providers, playback, signaling)
//! - Call lifecycle states and the pure transition table
//! - Turn records and outcomes
//! - Language classification for Hindi/English/Hinglish/mixed text
//! - Cancellation tokens
//! - Error types

pub mod audio;
pub mod call;
pub mod cancel;
pub mod error;
pub mod language;
pub mod traits;
pub mod turn;

pub use audio::AudioRef;
pub use call::{CallState, Endpoint, HangupOrigin, SessionEvent, SessionId};
pub use cancel::{CancelSource, CancelToken};
pub use error::{Error, ProviderFailure, Result};
pub use language::{DetectedLanguage, LanguageClassifier, Script, DEFAULT_HINGLISH_THRESHOLD};
pub use turn::{Transcript, Turn, TurnOutcome};

pub use traits::{
    AudioSink, CaptureSource, ResponseGenerator, SignalingPort, SynthesisProvider, Transcriber,
};
