//! Turn executor
//!
//! Runs exactly one capture→transcribe→classify→generate→synthesize→play
//! cycle and always hands back a committed [`Turn`] record. Step failures
//! are absorbed into the turn outcome and never propagate to the session
//! machine; only the session's cancellation token can short-circuit the
//! cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use voicebot_config::TurnSettings;
use voicebot_core::{
    AudioSink, CancelToken, CaptureSource, LanguageClassifier, ResponseGenerator, Result,
    SessionId, Transcriber, Turn, TurnOutcome,
};

use crate::fallback::SynthesisChain;

/// Per-turn knobs
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Bounded wait for speech at the start of the turn
    pub capture_ceiling: Duration,
    /// Transcripts below this confidence count as transcription failures
    pub min_transcript_confidence: f32,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            capture_ceiling: Duration::from_secs(5),
            min_transcript_confidence: 0.0,
        }
    }
}

impl TurnConfig {
    /// Derive the per-turn knobs from loaded settings
    pub fn from_settings(settings: &TurnSettings) -> Self {
        Self {
            capture_ceiling: Duration::from_millis(settings.capture_ceiling_ms),
            min_transcript_confidence: settings.min_transcript_confidence,
        }
    }
}

/// Executes one request/response cycle per invocation.
///
/// Invocations for the same session must be strictly sequential; the
/// session worker that owns the executor enforces that.
pub struct TurnExecutor {
    capture: Arc<dyn CaptureSource>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn ResponseGenerator>,
    chain: Arc<SynthesisChain>,
    sink: Arc<dyn AudioSink>,
    classifier: LanguageClassifier,
    config: TurnConfig,
}

impl TurnExecutor {
    pub fn new(
        capture: Arc<dyn CaptureSource>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn ResponseGenerator>,
        chain: Arc<SynthesisChain>,
        sink: Arc<dyn AudioSink>,
        classifier: LanguageClassifier,
        config: TurnConfig,
    ) -> Self {
        Self {
            capture,
            transcriber,
            generator,
            chain,
            sink,
            classifier,
            config,
        }
    }

    /// Run one turn for the session.
    ///
    /// `history` is the committed conversation so far; `turn_index` is the
    /// next monotonic index. The returned record is final: the caller
    /// appends it to the history unchanged.
    pub async fn run_turn(
        &self,
        session_id: &SessionId,
        turn_index: u64,
        history: &[Turn],
        cancel: &CancelToken,
    ) -> Turn {
        let mut turn = Turn::begin(turn_index);

        // Capture
        let audio = match with_cancel(cancel, self.capture.capture(session_id, self.config.capture_ceiling)).await {
            None => return self.committed(session_id, turn.finish(TurnOutcome::Cancelled)),
            Some(Ok(Some(audio))) => audio,
            Some(Ok(None)) => {
                tracing::info!(
                    session = %session_id,
                    turn = turn_index,
                    ceiling_ms = self.config.capture_ceiling.as_millis() as u64,
                    "no speech before capture ceiling"
                );
                return self.committed(session_id, turn.finish(TurnOutcome::CaptureTimeout));
            }
            Some(Err(err)) => {
                // A broken capture path resolves like a silent window; the
                // session stays available for the next trigger.
                tracing::warn!(session = %session_id, turn = turn_index, error = %err, "capture failed");
                return self.committed(session_id, turn.finish(TurnOutcome::CaptureTimeout));
            }
        };
        turn.captured_audio = Some(audio.clone());

        // Transcribe
        let transcript = match with_cancel(cancel, self.transcriber.transcribe(&audio)).await {
            None => return self.committed(session_id, turn.finish(TurnOutcome::Cancelled)),
            Some(Ok(t))
                if !t.text.trim().is_empty()
                    && t.confidence >= self.config.min_transcript_confidence =>
            {
                t
            }
            Some(result) => {
                match result {
                    Ok(t) => tracing::warn!(
                        session = %session_id,
                        turn = turn_index,
                        confidence = t.confidence,
                        "unusable transcript"
                    ),
                    Err(err) => tracing::warn!(
                        session = %session_id,
                        turn = turn_index,
                        engine = self.transcriber.engine_name(),
                        error = %err,
                        "transcription failed"
                    ),
                }
                return self.committed(session_id, turn.finish(TurnOutcome::TranscriptionFailed));
            }
        };
        turn.transcript = Some(transcript.text.clone());

        // Classify: pure, never fails.
        let language = self.classifier.classify(&transcript.text);
        turn.detected_language = language;
        tracing::debug!(
            session = %session_id,
            turn = turn_index,
            language = language.code(),
            "transcript classified"
        );

        if cancel.is_cancelled() {
            return self.committed(session_id, turn.finish(TurnOutcome::Cancelled));
        }

        // Generate. A failure substitutes the fixed local phrase so the
        // caller is never left in silence.
        let (response, generation_failed) = match with_cancel(
            cancel,
            self.generator.generate(&transcript.text, language, history),
        )
        .await
        {
            None => return self.committed(session_id, turn.finish(TurnOutcome::Cancelled)),
            Some(Ok(text)) => (text, false),
            Some(Err(err)) => {
                tracing::warn!(
                    session = %session_id,
                    turn = turn_index,
                    model = self.generator.model_name(),
                    error = %err,
                    "generation failed, using fallback phrase"
                );
                (language.fallback_phrase().to_string(), true)
            }
        };
        turn.response_text = Some(response.clone());

        let final_outcome = if generation_failed {
            TurnOutcome::GenerationFailed
        } else {
            TurnOutcome::Completed
        };

        // Synthesize
        let synthesized = match with_cancel(cancel, self.chain.synthesize(&response, language)).await
        {
            None => return self.committed(session_id, turn.finish(TurnOutcome::Cancelled)),
            Some(Ok(out)) => out,
            Some(Err(err)) => {
                tracing::warn!(session = %session_id, turn = turn_index, error = %err, "synthesis exhausted");
                // A failed generation keeps its own outcome even when the
                // fallback phrase could not be synthesized either.
                let outcome = if generation_failed {
                    TurnOutcome::GenerationFailed
                } else {
                    TurnOutcome::SynthesisFailed
                };
                return self.committed(session_id, turn.finish(outcome));
            }
        };
        turn.synthesized_audio = Some(synthesized.audio.clone());
        turn.synthesis_provider = Some(synthesized.provider.clone());

        // Play. Failures are logged but do not change the outcome.
        match with_cancel(cancel, self.sink.play(&synthesized.audio, session_id)).await {
            None => return self.committed(session_id, turn.finish(TurnOutcome::Cancelled)),
            Some(Err(err)) => {
                tracing::warn!(session = %session_id, turn = turn_index, error = %err, "playback failed");
            }
            Some(Ok(())) => {}
        }

        self.committed(session_id, turn.finish(final_outcome))
    }

    /// Synthesize and play a one-off phrase (greetings, announcements).
    ///
    /// Produces no turn record; the language is classified from the text.
    pub async fn speak(&self, session_id: &SessionId, text: &str) -> Result<()> {
        let language = self.classifier.classify(text);
        let output = self.chain.synthesize(text, language).await?;
        self.sink.play(&output.audio, session_id).await
    }

    fn committed(&self, session_id: &SessionId, turn: Turn) -> Turn {
        tracing::info!(
            session = %session_id,
            turn = turn.turn_index,
            outcome = %turn.outcome,
            language = turn.detected_language.code(),
            provider = turn.synthesis_provider.as_deref().unwrap_or("-"),
            "turn committed"
        );
        turn
    }
}

/// Race a step against the session's cancellation token.
///
/// `None` means the token fired first and the turn must short-circuit.
async fn with_cancel<T>(cancel: &CancelToken, step: impl Future<Output = T>) -> Option<T> {
    let mut cancel = cancel.clone();
    tokio::select! {
        _ = cancel.cancelled() => None,
        out = step => Some(out),
    }
}
