//! Language classification for mixed Hindi-English conversations
//!
//! The classifier is a pure function over input text: identical input always
//! yields identical output, and it holds no session state. It distinguishes
//! Devanagari Hindi, plain English, romanized Hindi (Hinglish), and
//! script-mixed text.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Default fraction of known transliterated-Hindi tokens required to call
/// Latin-script text Hinglish.
pub const DEFAULT_HINGLISH_THRESHOLD: f32 = 0.20;

/// Language detected for a single utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DetectedLanguage {
    /// Devanagari-script Hindi
    Hindi,
    /// Latin-script English
    English,
    /// Latin-script text carrying transliterated Hindi vocabulary
    Hinglish,
    /// Devanagari and Latin scripts in the same utterance
    Mixed,
    /// Empty or unclassifiable input
    #[default]
    Unknown,
}

impl DetectedLanguage {
    /// Get language tag for logging and provider selection
    pub fn code(&self) -> &'static str {
        match self {
            Self::Hindi => "hi",
            Self::English => "en",
            Self::Hinglish => "hi-en",
            Self::Mixed => "mixed",
            Self::Unknown => "und",
        }
    }

    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hindi => "Hindi",
            Self::English => "English",
            Self::Hinglish => "Hinglish",
            Self::Mixed => "Mixed",
            Self::Unknown => "Unknown",
        }
    }

    /// Fixed local phrase spoken when response generation fails.
    ///
    /// Keeps the call audible even when the generation backend is down.
    pub fn fallback_phrase(&self) -> &'static str {
        match self {
            Self::Hindi => "मुझे समझ नहीं आया। कृपया दोबारा कहें।",
            Self::English | Self::Unknown => "I didn't catch that. Please try again.",
            Self::Hinglish | Self::Mixed => {
                "I didn't catch that. मुझे समझ नहीं आया। Please try again."
            }
        }
    }

    /// Greeting spoken when a call goes active
    pub fn greeting(&self) -> &'static str {
        match self {
            Self::Hindi => "नमस्ते! मैं आपका AI असिस्टेंट हूं। आज मैं आपकी कैसे मदद कर सकता हूं?",
            Self::English | Self::Unknown => {
                "Hello! I'm your AI assistant. How can I help you today?"
            }
            Self::Hinglish | Self::Mixed => {
                "Hello! नमस्ते! I'm your AI assistant. How can I help you today?"
            }
        }
    }
}

impl std::fmt::Display for DetectedLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Script systems the classifier cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Script {
    Latin,
    Devanagari,
}

impl Script {
    /// Check if a character belongs to this script
    pub fn contains_char(&self, c: char) -> bool {
        match self {
            Self::Latin => c.is_ascii_alphabetic(),
            Self::Devanagari => {
                let code = c as u32;
                (0x0900..=0x097F).contains(&code)
            }
        }
    }
}

/// Transliterated Hindi vocabulary commonly seen in romanized transcripts.
/// Matching is whole-word, lowercase.
static HINGLISH_TOKENS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "namaste", "kaise", "ho", "hai", "haan", "nahi", "kripya", "dhanyavad", "madad", "samay",
        "tarikh", "pata", "bhai", "didi", "ji", "aap", "hum", "mera", "meri", "kya", "kyu", "kyon",
        "kab", "kahan", "kidhar", "chahiye", "karna", "hoga", "krna", "krunga", "krungi",
    ]
    .into_iter()
    .collect()
});

/// Deterministic, stateless language classifier.
///
/// Decision policy, applied in order:
/// 1. Devanagari present and no Latin words: `Hindi`
/// 2. Latin-only and no known transliterated tokens: `English`
/// 3. Devanagari and Latin mixed: `Mixed`
/// 4. Latin-only with at least `threshold` fraction of known tokens: `Hinglish`
/// 5. Otherwise: `Unknown`
#[derive(Debug, Clone)]
pub struct LanguageClassifier {
    threshold: f32,
    extra_tokens: HashSet<String>,
}

impl Default for LanguageClassifier {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_HINGLISH_THRESHOLD,
            extra_tokens: HashSet::new(),
        }
    }
}

impl LanguageClassifier {
    /// Create a classifier with a custom Hinglish token threshold
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    /// Extend the built-in transliterated-Hindi vocabulary
    pub fn with_extra_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_tokens
            .extend(tokens.into_iter().map(|t| t.into().to_lowercase()));
        self
    }

    /// Get the configured threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify a single utterance. Never fails; ambiguous input yields
    /// [`DetectedLanguage::Unknown`].
    pub fn classify(&self, text: &str) -> DetectedLanguage {
        let has_devanagari = text.chars().any(|c| Script::Devanagari.contains_char(c));

        let latin_words: Vec<String> = text
            .split_whitespace()
            .filter(|w| w.chars().any(|c| Script::Latin.contains_char(c)))
            .map(|w| {
                w.chars()
                    .filter(|c| Script::Latin.contains_char(*c))
                    .collect::<String>()
                    .to_lowercase()
            })
            .collect();

        match (has_devanagari, latin_words.is_empty()) {
            (true, true) => DetectedLanguage::Hindi,
            (true, false) => DetectedLanguage::Mixed,
            (false, true) => DetectedLanguage::Unknown,
            (false, false) => {
                let known = latin_words.iter().filter(|w| self.is_known(w)).count();
                if known == 0 {
                    DetectedLanguage::English
                } else if known as f32 / latin_words.len() as f32 >= self.threshold {
                    DetectedLanguage::Hinglish
                } else {
                    DetectedLanguage::Unknown
                }
            }
        }
    }

    fn is_known(&self, word: &str) -> bool {
        HINGLISH_TOKENS.contains(word) || self.extra_tokens.contains(word)
    }
}
