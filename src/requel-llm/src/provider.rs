//! LLM provider abstraction.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common_config::GenerationConfig;
use common_error::RequelResult;

/// A provider's answer to one generation request.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    /// Candidate SQL texts, post-processed from the raw output.
    pub candidates: Vec<String>,
    /// Raw response body as received.
    pub raw_response: String,
    /// Whether the provider produced usable output.
    pub success: bool,
    /// Provider-reported error when `success` is false.
    pub error_message: String,
    /// Wall time of the upstream call in milliseconds.
    pub latency_ms: f64,
}

impl LlmResponse {
    /// Successful response.
    pub fn completed(candidates: Vec<String>, raw_response: impl Into<String>) -> Self {
        Self {
            candidates,
            raw_response: raw_response.into(),
            success: true,
            error_message: String::new(),
            latency_ms: 0.0,
        }
    }

    /// Failed response with a provider-reported message.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: error_message.into(),
            ..Self::default()
        }
    }
}

/// A backend that can generate SQL rewrite candidates.
///
/// Implementations translate `generate` into their native wire protocol;
/// the client makes no assumptions beyond this contract and probes
/// `available` before each call.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate candidates for a prompt.
    async fn generate(&self, prompt: &str, config: &GenerationConfig)
        -> RequelResult<LlmResponse>;

    /// Registry name; also part of the request fingerprint.
    fn name(&self) -> &str;

    /// Health probe.
    async fn available(&self) -> bool;
}

/// In-process provider returning canned candidates.
///
/// Stands in for a real backend in tests and offline tooling; the call
/// counter is what single-flight assertions observe.
pub struct StaticProvider {
    name: String,
    candidates: Vec<String>,
    available: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticProvider {
    /// Provider answering every request with the given candidates.
    pub fn new(name: impl Into<String>, candidates: Vec<String>) -> Self {
        Self {
            name: name.into(),
            candidates,
            available: true,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Mark the provider as unavailable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Delay each generation, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of `generate` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for StaticProvider {
    async fn generate(
        &self,
        _prompt: &str,
        _config: &GenerationConfig,
    ) -> RequelResult<LlmResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(LlmResponse::completed(
            self.candidates.clone(),
            self.candidates.join("\n---\n"),
        ))
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn available(&self) -> bool {
        self.available
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider_counts_calls() {
        let provider = StaticProvider::new("static", vec!["SELECT 1".to_string()]);
        assert_eq!(provider.calls(), 0);

        let response = provider
            .generate("prompt", &GenerationConfig::default())
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_provider() {
        let provider = StaticProvider::new("down", vec![]).unavailable();
        assert!(!provider.available().await);
    }
}
