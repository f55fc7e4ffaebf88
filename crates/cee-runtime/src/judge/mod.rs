//! Tier 2: LLM-as-judge.
//!
//! A [`JudgeClient`] scores one output on the five judge dimensions. The
//! production client, [`LlmJudge`], sends the judge prompt to an
//! [`LlmProvider`], retries transient failures, trips a circuit breaker on
//! repeated ones and validates the reply against the judge response schema.
//! [`CachedJudge`] memoizes outcomes for identical inputs.

mod cache;
pub mod parser;
pub mod prompts;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cee_core::Tier2Outcome;
use thiserror::Error;

use crate::config::JudgeConfig;
use crate::providers::{CompletionConfig, LlmProvider, ProviderError, ProviderRegistry};
use crate::resilience::{with_retry, CircuitBreaker, CircuitBreakerConfig, RetryConfig};

pub use cache::CachedJudge;
pub use parser::parse_judge_response;

/// Tier 2 failures. Each one fails the run it occurred in.
#[derive(Error, Debug, Clone)]
pub enum JudgeError {
    #[error("Judge provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Could not parse judge response: {0}")]
    Parse(String),

    #[error("Judge response failed validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Judge call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Judge circuit is open, provider calls suspended")]
    CircuitOpen,
}

impl JudgeError {
    /// Whether the same run could succeed if submitted again later.
    pub fn is_transient(&self) -> bool {
        match self {
            JudgeError::Provider(e) => e.is_retryable(),
            JudgeError::Timeout(_) | JudgeError::CircuitOpen => true,
            JudgeError::Parse(_) | JudgeError::Schema(_) => false,
        }
    }
}

/// Scores one output on the five judge dimensions.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(
        &self,
        prompt: &str,
        output: &str,
        reference: Option<&str>,
    ) -> Result<Tier2Outcome, JudgeError>;

    /// Model identifier recorded on every outcome.
    fn model(&self) -> &str;
}

#[async_trait]
impl<J: JudgeClient + ?Sized> JudgeClient for Arc<J> {
    async fn judge(
        &self,
        prompt: &str,
        output: &str,
        reference: Option<&str>,
    ) -> Result<Tier2Outcome, JudgeError> {
        (**self).judge(prompt, output, reference).await
    }

    fn model(&self) -> &str {
        (**self).model()
    }
}

/// Judge backed by an LLM provider.
pub struct LlmJudge {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &JudgeConfig) -> Self {
        Self {
            provider,
            completion: config.completion_config(),
            retry: RetryConfig::default(),
            breaker: CircuitBreaker::default(),
        }
    }

    /// Build the configured provider through `registry`.
    pub fn from_registry(
        registry: &ProviderRegistry,
        config: &JudgeConfig,
    ) -> Result<Self, ProviderError> {
        let provider = registry.create(&config.provider, &config.provider_options)?;
        Ok(Self::new(provider, config))
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

#[async_trait]
impl JudgeClient for LlmJudge {
    async fn judge(
        &self,
        prompt: &str,
        output: &str,
        reference: Option<&str>,
    ) -> Result<Tier2Outcome, JudgeError> {
        if self.breaker.is_open() {
            tracing::warn!(provider = self.provider.name(), "Judge circuit open, failing fast");
            return Err(JudgeError::CircuitOpen);
        }

        let messages = prompts::judge_messages(prompt, output, reference);
        let provider = &self.provider;
        let completion = &self.completion;

        let response = with_retry(&self.retry, self.provider.name(), move || {
            let messages = messages.clone();
            async move { provider.complete(messages, completion).await }
        })
        .await;

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                self.breaker.record_failure();
                tracing::error!(provider = self.provider.name(), error = %e, "Judge call failed");
                return Err(e.into());
            }
        };

        // The provider answered; a malformed reply is not a provider outage
        self.breaker.record_success();

        tracing::debug!(
            provider = self.provider.name(),
            model = %response.model,
            tokens = response.usage.total(),
            "Judge response received"
        );

        parse_judge_response(&response.content, &self.completion.model).inspect_err(|e| {
            tracing::warn!(provider = self.provider.name(), error = %e, "Judge response rejected");
        })
    }

    fn model(&self) -> &str {
        &self.completion.model
    }
}

impl std::fmt::Debug for LlmJudge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmJudge")
            .field("provider", &self.provider.name())
            .field("model", &self.completion.model)
            .field("retry", &self.retry)
            .finish()
    }
}
