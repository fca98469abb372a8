//! Synthesis provider fallback chain
//!
//! Providers are tried strictly in descending priority order among those
//! whose capability check accepts the requested language. A provider fails
//! by erroring, timing out, or returning empty audio; the chain then moves
//! to the next eligible provider without retrying. The chain keeps no
//! health state between calls.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use voicebot_config::SynthesisSettings;
use voicebot_core::{
    AudioRef, DetectedLanguage, Error, ProviderFailure, Result, SynthesisProvider,
};

/// Default per-provider timeout
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// One provider slot in the chain: static configuration, never mutated at
/// runtime
pub struct ProviderDescriptor {
    /// Name used in logs, failures, and turn records
    pub name: String,
    /// Higher priority is tried first
    pub priority: u8,
    /// The synthesis backend itself
    pub provider: Arc<dyn SynthesisProvider>,
}

impl ProviderDescriptor {
    /// Describe a provider, taking the name from the provider itself
    pub fn new(priority: u8, provider: Arc<dyn SynthesisProvider>) -> Self {
        Self {
            name: provider.provider_name().to_string(),
            priority,
            provider,
        }
    }

    /// Describe a provider under an explicit name
    pub fn named(
        name: impl Into<String>,
        priority: u8,
        provider: Arc<dyn SynthesisProvider>,
    ) -> Self {
        Self {
            name: name.into(),
            priority,
            provider,
        }
    }
}

impl std::fmt::Debug for ProviderDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderDescriptor")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Successful synthesis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisOutput {
    pub audio: AudioRef,
    /// Name of the provider that produced the audio
    pub provider: String,
}

/// Priority-ordered chain over the configured providers
pub struct SynthesisChain {
    providers: Vec<ProviderDescriptor>,
    per_provider_timeout: Duration,
}

impl SynthesisChain {
    /// Build a chain from descriptors. Ordering by priority happens here,
    /// once; ties keep registration order.
    pub fn new(mut providers: Vec<ProviderDescriptor>) -> Self {
        providers.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            providers,
            per_provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Create using the builder
    pub fn builder() -> SynthesisChainBuilder {
        SynthesisChainBuilder::default()
    }

    /// Override the per-provider timeout
    pub fn with_timeout(mut self, per_provider_timeout: Duration) -> Self {
        self.per_provider_timeout = per_provider_timeout;
        self
    }

    /// Number of configured providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Provider names in the order they would be tried for `language`
    pub fn eligible_names(&self, language: DetectedLanguage) -> Vec<&str> {
        self.providers
            .iter()
            .filter(|d| d.provider.supports_language(language))
            .map(|d| d.name.as_str())
            .collect()
    }

    /// Synthesize `text`, failing over until a provider delivers audio.
    ///
    /// Returns [`Error::AllProvidersExhausted`] carrying one failure reason
    /// per eligible provider when none succeeds.
    pub async fn synthesize(
        &self,
        text: &str,
        language: DetectedLanguage,
    ) -> Result<SynthesisOutput> {
        let eligible: Vec<&ProviderDescriptor> = self
            .providers
            .iter()
            .filter(|d| d.provider.supports_language(language))
            .collect();

        if eligible.is_empty() {
            tracing::warn!(language = language.code(), "no eligible synthesis provider");
            return Err(Error::AllProvidersExhausted(Vec::new()));
        }

        let mut failures = Vec::with_capacity(eligible.len());
        for descriptor in eligible {
            let reason = match timeout(
                self.per_provider_timeout,
                descriptor.provider.synthesize(text, language),
            )
            .await
            {
                Err(_) => format!(
                    "timed out after {} ms",
                    self.per_provider_timeout.as_millis()
                ),
                Ok(Err(err)) => err.to_string(),
                Ok(Ok(audio)) if audio.is_empty() => "returned empty audio".to_string(),
                Ok(Ok(audio)) => {
                    tracing::debug!(
                        provider = %descriptor.name,
                        language = language.code(),
                        duration_ms = audio.duration_ms,
                        "synthesis succeeded"
                    );
                    return Ok(SynthesisOutput {
                        audio,
                        provider: descriptor.name.clone(),
                    });
                }
            };

            tracing::warn!(
                provider = %descriptor.name,
                language = language.code(),
                %reason,
                "synthesis provider failed, trying next"
            );
            failures.push(ProviderFailure {
                provider: descriptor.name.clone(),
                reason,
            });
        }

        Err(Error::AllProvidersExhausted(failures))
    }
}

/// Builder for [`SynthesisChain`]
#[derive(Default)]
pub struct SynthesisChainBuilder {
    providers: Vec<ProviderDescriptor>,
    per_provider_timeout: Option<Duration>,
    priority_overrides: Vec<(String, u8)>,
}

impl SynthesisChainBuilder {
    /// Register a provider with the given priority
    pub fn provider(mut self, priority: u8, provider: Arc<dyn SynthesisProvider>) -> Self {
        self.providers.push(ProviderDescriptor::new(priority, provider));
        self
    }

    /// Register a pre-built descriptor
    pub fn descriptor(mut self, descriptor: ProviderDescriptor) -> Self {
        self.providers.push(descriptor);
        self
    }

    /// Set the per-provider timeout
    pub fn per_provider_timeout(mut self, timeout: Duration) -> Self {
        self.per_provider_timeout = Some(timeout);
        self
    }

    /// Apply loaded settings: the per-provider timeout, plus priority
    /// overrides matched against registered provider names
    pub fn with_settings(mut self, settings: &SynthesisSettings) -> Self {
        self.per_provider_timeout = Some(Duration::from_millis(settings.provider_timeout_ms));
        self.priority_overrides = settings
            .providers
            .iter()
            .map(|p| (p.name.clone(), p.priority))
            .collect();
        self
    }

    /// Build the chain
    pub fn build(self) -> SynthesisChain {
        let mut providers = self.providers;
        for descriptor in &mut providers {
            if let Some((_, priority)) = self
                .priority_overrides
                .iter()
                .find(|(name, _)| *name == descriptor.name)
            {
                descriptor.priority = *priority;
            }
        }
        let chain = SynthesisChain::new(providers);
        match self.per_provider_timeout {
            Some(timeout) => chain.with_timeout(timeout),
            None => chain,
        }
    }
}
