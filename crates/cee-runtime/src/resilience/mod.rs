//! Resilience for judge calls:
//! - Circuit breaker so a dead provider fails runs fast
//! - Retry with exponential backoff for transient errors

mod circuit_breaker;
mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{with_retry, RetryConfig};
