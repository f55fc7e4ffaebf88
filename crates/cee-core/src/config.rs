//! Core configuration: trust weights, drift thresholds, rule-checker limits.
//!
//! Configuration can be loaded from YAML or from the environment. It is
//! validated once; an invalid configuration is fatal and never retried.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tolerance for the weight sum check.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Tier weights must sum to 1.0 (got {0})")]
    WeightSum(f64),

    #[error("Tier weight {name} must be non-negative (got {value})")]
    NegativeWeight { name: &'static str, value: f64 },

    #[error("Drift threshold {name} must be positive (got {value})")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: String, value: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported judge provider: {0}")]
    UnsupportedProvider(String),
}

/// Relative weights of the three tiers in the trust score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustWeights {
    pub tier1: f64,
    pub tier2: f64,
    pub tier3: f64,
}

impl Default for TrustWeights {
    fn default() -> Self {
        Self {
            tier1: 0.25,
            tier2: 0.55,
            tier3: 0.20,
        }
    }
}

impl TrustWeights {
    pub fn new(tier1: f64, tier2: f64, tier3: f64) -> Result<Self, ConfigError> {
        let weights = Self { tier1, tier2, tier3 };
        weights.validate()?;
        Ok(weights)
    }

    /// Weights must be non-negative and sum to 1.0 within the tolerance.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("tier1", self.tier1),
            ("tier2", self.tier2),
            ("tier3", self.tier3),
        ] {
            if value < 0.0 || value.is_nan() {
                return Err(ConfigError::NegativeWeight { name, value });
            }
        }

        let total = self.tier1 + self.tier2 + self.tier3;
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(total));
        }
        Ok(())
    }
}

/// Thresholds at which a drift alert fires.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftThresholds {
    /// Absolute change in metric points
    pub absolute: f64,

    /// Relative change as a fraction of baseline (0.10 = 10%)
    pub relative: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            absolute: 5.0,
            relative: 0.10,
        }
    }
}

impl DriftThresholds {
    pub fn new(absolute: f64, relative: f64) -> Result<Self, ConfigError> {
        let thresholds = Self { absolute, relative };
        thresholds.validate()?;
        Ok(thresholds)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.absolute > 0.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "absolute",
                value: self.absolute,
            });
        }
        if !(self.relative > 0.0) {
            return Err(ConfigError::InvalidThreshold {
                name: "relative",
                value: self.relative,
            });
        }
        Ok(())
    }
}

/// Configuration for the deterministic core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub weights: TrustWeights,
    pub drift: DriftThresholds,

    /// Maximum whitespace-delimited tokens before tier 1 fails
    pub token_limit: usize,

    /// Trailing window used for drift baselines
    #[serde(with = "duration_human")]
    pub baseline_lookback: Duration,

    /// Trailing window used for the drift stability index
    #[serde(with = "duration_human")]
    pub stability_lookback: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            weights: TrustWeights::default(),
            drift: DriftThresholds::default(),
            token_limit: 4096,
            baseline_lookback: Duration::from_secs(7 * 24 * 3600),
            stability_lookback: Duration::from_secs(30 * 24 * 3600),
        }
    }
}

impl CoreConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Defaults overridden by `TIER_{1,2,3}_WEIGHT`, `DRIFT_THRESHOLD_ABSOLUTE`,
    /// `DRIFT_THRESHOLD_RELATIVE` and `TOKEN_LIMIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply environment overrides on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(v) = env_parse::<f64>("TIER_1_WEIGHT")? {
            self.weights.tier1 = v;
        }
        if let Some(v) = env_parse::<f64>("TIER_2_WEIGHT")? {
            self.weights.tier2 = v;
        }
        if let Some(v) = env_parse::<f64>("TIER_3_WEIGHT")? {
            self.weights.tier3 = v;
        }
        if let Some(v) = env_parse::<f64>("DRIFT_THRESHOLD_ABSOLUTE")? {
            self.drift.absolute = v;
        }
        if let Some(v) = env_parse::<f64>("DRIFT_THRESHOLD_RELATIVE")? {
            self.drift.relative = v;
        }
        if let Some(v) = env_parse::<usize>("TOKEN_LIMIT")? {
            self.token_limit = v;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        self.drift.validate()?;
        Ok(())
    }
}

/// Read and parse an environment variable; unset is `Ok(None)`.
pub fn env_parse<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value: raw,
            }),
        Err(_) => Ok(None),
    }
}

/// Serde adapter for humantime strings ("7days", "30s").
pub mod duration_human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_valid() {
        assert!(TrustWeights::default().validate().is_ok());
    }

    #[test]
    fn test_weight_sum_tolerance() {
        assert!(TrustWeights::new(0.25, 0.55, 0.205).is_ok());
        assert!(TrustWeights::new(0.25, 0.55, 0.19).is_ok());
        assert!(matches!(
            TrustWeights::new(0.3, 0.55, 0.2),
            Err(ConfigError::WeightSum(_))
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        assert!(matches!(
            TrustWeights::new(-0.1, 0.9, 0.2),
            Err(ConfigError::NegativeWeight { name: "tier1", .. })
        ));
    }

    #[test]
    fn test_thresholds_must_be_positive() {
        assert!(DriftThresholds::new(5.0, 0.1).is_ok());
        assert!(DriftThresholds::new(0.0, 0.1).is_err());
        assert!(DriftThresholds::new(5.0, -0.1).is_err());
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
weights:
  tier1: 0.3
  tier2: 0.5
  tier3: 0.2
drift:
  absolute: 3.0
  relative: 0.05
token_limit: 512
baseline_lookback: 3days
"#;
        let config = CoreConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.weights.tier1, 0.3);
        assert_eq!(config.drift.absolute, 3.0);
        assert_eq!(config.token_limit, 512);
        assert_eq!(config.baseline_lookback, Duration::from_secs(3 * 24 * 3600));
        // Unspecified fields keep defaults
        assert_eq!(config.stability_lookback, Duration::from_secs(30 * 24 * 3600));
    }

    #[test]
    fn test_yaml_rejects_bad_weights() {
        let yaml = r#"
weights:
  tier1: 0.5
  tier2: 0.5
  tier3: 0.5
"#;
        assert!(matches!(
            CoreConfig::from_yaml(yaml),
            Err(ConfigError::WeightSum(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip_durations() {
        let config = CoreConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back = CoreConfig::from_yaml(&yaml).unwrap();
        assert_eq!(back, config);
    }
}
