//! Capability traits
//!
//! The call core consumes these seams and never depends on concrete speech,
//! model, or telephony implementations. Everything here is object-safe and
//! `Send + Sync + 'static` so capabilities can be shared across session
//! workers behind `Arc<dyn _>`.

mod generation;
mod signaling;
mod speech;

pub use generation::ResponseGenerator;
pub use signaling::SignalingPort;
pub use speech::{AudioSink, CaptureSource, SynthesisProvider, Transcriber};
