//! Audio capture, transcription, synthesis, and playback seams

use std::time::Duration;

use async_trait::async_trait;

use crate::audio::AudioRef;
use crate::call::SessionId;
use crate::error::Result;
use crate::language::DetectedLanguage;
use crate::turn::Transcript;

/// Audio capture capability
///
/// One bounded-wait request per turn. The wait ceiling is the *capture
/// timeout* from the turn configuration, not a cancellation: expiring is a
/// normal result, not an error.
#[async_trait]
pub trait CaptureSource: Send + Sync + 'static {
    /// Wait up to `max_wait` for speech on the session's media path.
    ///
    /// Returns `Ok(None)` when no speech activity was observed before the
    /// ceiling.
    async fn capture(&self, session_id: &SessionId, max_wait: Duration)
        -> Result<Option<AudioRef>>;
}

/// Speech-to-text capability
#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    /// Transcribe one captured utterance
    async fn transcribe(&self, audio: &AudioRef) -> Result<Transcript>;

    /// Engine name for logging
    fn engine_name(&self) -> &str;
}

/// One text-to-speech backend inside the fallback chain
///
/// # Example
///
/// ```ignore
/// let provider: Arc<dyn SynthesisProvider> = Arc::new(AzureNeuralTts::new(config));
/// if provider.supports_language(DetectedLanguage::Hindi) {
///     let audio = provider.synthesize("नमस्ते", DetectedLanguage::Hindi).await?;
/// }
/// ```
#[async_trait]
pub trait SynthesisProvider: Send + Sync + 'static {
    /// Synthesize `text` in the given language.
    ///
    /// Returning empty audio is treated as a failure by the fallback chain.
    async fn synthesize(&self, text: &str, language: DetectedLanguage) -> Result<AudioRef>;

    /// Capability check consulted before this provider is tried
    fn supports_language(&self, language: DetectedLanguage) -> bool;

    /// Provider name for descriptors, logging, and turn records
    fn provider_name(&self) -> &str;
}

/// Audio playback capability
#[async_trait]
pub trait AudioSink: Send + Sync + 'static {
    /// Play synthesized audio on the session's media path.
    ///
    /// Failures are logged by the turn executor and never change a
    /// committed turn outcome.
    async fn play(&self, audio: &AudioRef, session_id: &SessionId) -> Result<()>;
}
