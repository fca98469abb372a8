//! Response generation seam

use async_trait::async_trait;

use crate::error::Result;
use crate::language::DetectedLanguage;
use crate::turn::Turn;

/// Conversational response generation capability
///
/// The history slice is the session's committed conversation so far, oldest
/// first; the turn in progress is not part of it.
#[async_trait]
pub trait ResponseGenerator: Send + Sync + 'static {
    /// Produce a reply to `transcript`
    async fn generate(
        &self,
        transcript: &str,
        language: DetectedLanguage,
        history: &[Turn],
    ) -> Result<String>;

    /// Model name for logging
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGenerator;

    #[async_trait]
    impl ResponseGenerator for EchoGenerator {
        async fn generate(
            &self,
            transcript: &str,
            _language: DetectedLanguage,
            history: &[Turn],
        ) -> Result<String> {
            Ok(format!("({}) {}", history.len(), transcript))
        }

        fn model_name(&self) -> &str {
            "echo"
        }
    }

    #[tokio::test]
    async fn test_history_is_visible() {
        let llm: Box<dyn ResponseGenerator> = Box::new(EchoGenerator);
        let history = vec![Turn::begin(0)];
        let reply = llm
            .generate("hello", DetectedLanguage::English, &history)
            .await
            .unwrap();
        assert_eq!(reply, "(1) hello");
    }
}
