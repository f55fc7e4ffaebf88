//! # cee-runtime
//!
//! Async runtime of the Contextual Evaluation Engine.
//!
//! `cee-core` holds everything deterministic. This crate adds the parts that
//! wait on the outside world:
//! - the tier 2 LLM judge and the providers behind it
//! - retry, timeout and circuit breaking around judge calls
//! - the evaluation store (persistence boundary)
//! - the orchestrator driving a run through all tiers
//! - dashboard aggregation
//!
//! ## Example
//!
//! ```rust,ignore
//! use cee_core::EvaluationInput;
//! use cee_runtime::{EvaluationOrchestrator, ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env()?;
//! let orchestrator = EvaluationOrchestrator::from_config(config, &ProviderRegistry::with_defaults())?;
//!
//! let input = EvaluationInput::new("run-42", "What is the capital of France?", "Paris.", "gpt-4o");
//! let result = orchestrator.evaluate(input).await?;
//! println!("{} -> {:?}", result.status, result.trust_score.map(|s| s.overall));
//! ```

pub mod config;
pub mod dashboard;
pub mod judge;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod store;

pub use config::{CacheConfig, JudgeConfig, RuntimeConfig, SUPPORTED_PROVIDERS};
pub use dashboard::DashboardMetrics;
pub use judge::{CachedJudge, JudgeClient, JudgeError, LlmJudge};
pub use orchestrator::{EvaluationOrchestrator, EvaluationOrchestratorBuilder, RunError};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ProviderFactory, ProviderRegistry,
};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, RetryConfig};
pub use store::{EvaluationStore, InMemoryStore, StoreError};
