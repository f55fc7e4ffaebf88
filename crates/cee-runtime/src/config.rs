//! Runtime configuration: core settings plus the judge, resilience and
//! cache knobs.
//!
//! ```yaml
//! core:
//!   weights: { tier1: 0.25, tier2: 0.55, tier3: 0.20 }
//! judge:
//!   provider: anthropic
//!   model: claude-3-5-sonnet-20241022
//!   timeout: 45s
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use cee_core::config::{duration_human, env_parse, ConfigError, CoreConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::providers::{secrets, CompletionConfig};
use crate::resilience::{CircuitBreakerConfig, RetryConfig};

/// Judge providers this crate knows how to build.
pub const SUPPORTED_PROVIDERS: &[&str] = &["openai", "anthropic"];

/// How the tier 2 judge is reached.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Registry name of the provider
    pub provider: String,

    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,

    /// Upper bound on one judge call, retries included
    #[serde(with = "duration_human")]
    pub timeout: Duration,

    /// Passed verbatim to the provider factory (`api_key`, `base_url`).
    /// Credentials are masked when the config is serialized or debugged.
    #[serde(serialize_with = "secrets::serialize_redacted")]
    pub provider_options: JsonValue,
}

impl fmt::Debug for JudgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JudgeConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .field("provider_options", &secrets::redact_options(&self.provider_options))
            .finish()
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4-turbo-preview".to_string(),
            max_tokens: 2048,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
            provider_options: JsonValue::Object(Default::default()),
        }
    }
}

impl JudgeConfig {
    /// Request settings for one judge completion.
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            json_mode: self.provider == "openai",
            prompt_caching: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_PROVIDERS.contains(&self.provider.as_str()) {
            return Err(ConfigError::UnsupportedProvider(self.provider.clone()));
        }
        Ok(())
    }
}

/// Judge outcome cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_human")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 10_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub core: CoreConfig,
    pub judge: JudgeConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub retry: RetryConfig,
    pub cache: CacheConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Defaults with every supported environment variable applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply core variables plus `JUDGE_PROVIDER`, `JUDGE_MODEL` and
    /// `JUDGE_TIMEOUT` (humantime, e.g. `45s`).
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.core = self.core.with_env_overrides()?;

        if let Some(provider) = env_parse::<String>("JUDGE_PROVIDER")? {
            self.judge.provider = provider.to_lowercase();
        }
        if let Some(model) = env_parse::<String>("JUDGE_MODEL")? {
            self.judge.model = model;
        }
        if let Ok(raw) = std::env::var("JUDGE_TIMEOUT") {
            self.judge.timeout =
                humantime::parse_duration(raw.trim()).map_err(|_| ConfigError::InvalidEnv {
                    var: "JUDGE_TIMEOUT".to_string(),
                    value: raw,
                })?;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.core.validate()?;
        self.judge.validate()?;
        Ok(())
    }
}
