//! Layered settings
//!
//! Resolution order: built-in defaults, then an optional TOML file, then
//! environment variables with the `VOICEBOT` prefix (`__` as separator,
//! e.g. `VOICEBOT__TURN__CAPTURE_CEILING_MS=8000`).

use serde::{Deserialize, Serialize};

use voicebot_core::{LanguageClassifier, DEFAULT_HINGLISH_THRESHOLD};

use crate::ConfigError;

/// Default bounded wait for speech at the start of a turn
pub const DEFAULT_CAPTURE_CEILING_MS: u64 = 5_000;
/// Default per-provider synthesis timeout
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 10_000;

/// Top-level settings for the call core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub turn: TurnSettings,
    #[serde(default)]
    pub classifier: ClassifierSettings,
    #[serde(default)]
    pub synthesis: SynthesisSettings,
}

/// Registry and lifecycle knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Hard cap on concurrent sessions
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Active sessions silent for longer than this are hung up
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Play a greeting when a call goes active
    #[serde(default = "default_true")]
    pub greeting_enabled: bool,
    /// Override the built-in greeting text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting_text: Option<String>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            idle_timeout_secs: default_idle_timeout_secs(),
            greeting_enabled: true,
            greeting_text: None,
        }
    }
}

/// Per-turn knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnSettings {
    /// Bounded wait for speech before the turn resolves as a capture timeout
    #[serde(default = "default_capture_ceiling_ms")]
    pub capture_ceiling_ms: u64,
    /// Transcripts below this confidence count as transcription failures
    #[serde(default)]
    pub min_transcript_confidence: f32,
    /// Hang up after this many consecutive transcription failures.
    /// `None` disables the policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_transcription_failures: Option<u32>,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            capture_ceiling_ms: default_capture_ceiling_ms(),
            min_transcript_confidence: 0.0,
            max_consecutive_transcription_failures: None,
        }
    }
}

/// Language classifier knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Fraction of transliterated-Hindi tokens that makes Latin text Hinglish
    #[serde(default = "default_hinglish_threshold")]
    pub hinglish_token_threshold: f32,
    /// Extra transliterated tokens merged with the built-in vocabulary
    #[serde(default)]
    pub extra_hinglish_tokens: Vec<String>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            hinglish_token_threshold: default_hinglish_threshold(),
            extra_hinglish_tokens: Vec::new(),
        }
    }
}

impl ClassifierSettings {
    /// Build the classifier these settings describe
    pub fn build(&self) -> LanguageClassifier {
        LanguageClassifier::new(self.hinglish_token_threshold)
            .with_extra_tokens(self.extra_hinglish_tokens.iter().cloned())
    }
}

/// Synthesis fallback chain knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSettings {
    /// Per-provider timeout inside the fallback chain
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// Priority overrides by provider name; higher is tried first
    #[serde(default)]
    pub providers: Vec<ProviderPriority>,
}

impl Default for SynthesisSettings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
            providers: Vec::new(),
        }
    }
}

/// Startup-injected provider ordering
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPriority {
    pub name: String,
    pub priority: u8,
}

impl SynthesisSettings {
    /// Look up a configured priority override by provider name
    pub fn priority_for(&self, name: &str) -> Option<u8> {
        self.providers
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.priority)
    }
}

impl Settings {
    /// Sanity-check values that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.classifier.hinglish_token_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "classifier.hinglish_token_threshold".into(),
                message: "must be within [0.0, 1.0]".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.turn.min_transcript_confidence) {
            return Err(ConfigError::InvalidValue {
                field: "turn.min_transcript_confidence".into(),
                message: "must be within [0.0, 1.0]".into(),
            });
        }
        if self.turn.capture_ceiling_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "turn.capture_ceiling_ms".into(),
                message: "must be positive".into(),
            });
        }
        if self.session.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_sessions".into(),
                message: "must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Load settings from defaults, an optional file, and the environment
pub fn load_settings(path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder = builder.add_source(
        config::Environment::with_prefix("VOICEBOT")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;

    tracing::debug!(
        capture_ceiling_ms = settings.turn.capture_ceiling_ms,
        hinglish_threshold = settings.classifier.hinglish_token_threshold,
        max_sessions = settings.session.max_sessions,
        "settings loaded"
    );
    Ok(settings)
}

fn default_max_sessions() -> usize {
    32
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_capture_ceiling_ms() -> u64 {
    DEFAULT_CAPTURE_CEILING_MS
}

fn default_provider_timeout_ms() -> u64 {
    DEFAULT_PROVIDER_TIMEOUT_MS
}

fn default_hinglish_threshold() -> f32 {
    DEFAULT_HINGLISH_THRESHOLD
}

fn default_true() -> bool {
    true
}
