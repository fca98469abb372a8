//! Turn pipeline for the voice call bot
//!
//! Two pieces live here:
//! - [`SynthesisChain`]: priority-ordered text-to-speech fallback across
//!   pluggable providers
//! - [`TurnExecutor`]: the full capture→transcribe→classify→generate→
//!   synthesize→play cycle, committed as a [`voicebot_core::Turn`] record
//!
//! Both are backend-agnostic; concrete capabilities are injected through
//! the `voicebot-core` traits.

pub mod fallback;
pub mod turn;

pub use fallback::{ProviderDescriptor, SynthesisChain, SynthesisChainBuilder, SynthesisOutput};
pub use turn::{TurnConfig, TurnExecutor};
