//! # cee-core
//!
//! Deterministic core of the Contextual Evaluation Engine.
//!
//! Every generated output is scored in up to three tiers:
//! - **Tier 1**: instant rule checks (PII, profanity, length, reference similarity)
//! - **Tier 2**: an LLM judge scoring five quality dimensions (lives in `cee-runtime`)
//! - **Tier 3**: human review for the cases the first two tiers flag
//!
//! This crate holds the parts that need no network access: the data model,
//! the rule checker, the trust score calculator, the review coordinator and
//! the drift monitor.
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: trust scores are a pure function of the tier outcomes
//! 2. **Bounded**: every score lies in [0, 100]
//! 3. **Thread-safe**: the review queue and drift logs are internally synchronized
//!
//! ## Example
//!
//! ```rust,ignore
//! use cee_core::{PatternRuleChecker, RuleChecker, Tier2Outcome, TrustScoreCalculator};
//!
//! let tier1 = PatternRuleChecker::new(4096).check("Paris is the capital of France.", None);
//! let tier2 = Tier2Outcome::uniform(4, false, "gpt-4-turbo-preview")?;
//! let score = TrustScoreCalculator::default().calculate(&tier1, &tier2, None);
//!
//! println!("trust score: {}", score.overall);
//! ```

pub mod config;
pub mod drift;
pub mod review;
pub mod rules;
pub mod trust;
pub mod types;

pub use config::{ConfigError, CoreConfig, DriftThresholds, TrustWeights};
pub use drift::{DriftError, DriftMonitor, SampleFilter, SampleTags};
pub use review::{
    QueueStatus, ReviewCoordinator, ReviewDecision, ReviewError, ReviewPolicy, ReviewReason,
};
pub use rules::{PatternRuleChecker, RuleChecker};
pub use trust::TrustScoreCalculator;
pub use types::{
    DimensionScore, DriftAlert, DriftSample, EvaluationInput, EvaluationRecord, EvaluationResult,
    EvaluationStatus, JudgeDimension, ReviewRequest, ScoreRangeError, Severity, StatusError,
    Tier1Outcome, Tier2Outcome, Tier3Outcome, TrustScore, Verdict,
};

/// Drift metric under which every run's overall trust score is recorded.
pub const TRUST_SCORE_METRIC: &str = "trust_score";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_check_feeds_trust_score() {
        let checker = PatternRuleChecker::default();
        let tier1 = checker.check("Contact john.doe@email.com for help.", None);
        let tier2 = Tier2Outcome::uniform(5, false, "judge").unwrap();

        let score = TrustScoreCalculator::default().calculate(&tier1, &tier2, None);
        assert!(!tier1.passed);
        assert_eq!(score.tier1_score, 60.0);
        assert!(score.overall < 100.0);

        let decision = ReviewPolicy.needs_review(
            tier1.passed,
            tier2.uncertainty_flag,
            tier2.overall_score,
            tier2.safety_score(),
        );
        assert_eq!(decision.reason, Some(ReviewReason::Tier1Failed));
    }

    #[test]
    fn test_score_drift_round_trip() {
        let monitor = DriftMonitor::default();
        monitor.record(TRUST_SCORE_METRIC, 90.0, SampleTags::model("m"), None);
        monitor.record(TRUST_SCORE_METRIC, 40.0, SampleTags::model("m"), None);

        // baseline 65 includes the sample being checked
        let alert = monitor
            .check_drift(TRUST_SCORE_METRIC, 40.0, &SampleFilter::model("m"))
            .unwrap();
        assert_eq!(alert.baseline_value, 65.0);
        assert_eq!(alert.severity, Severity::Critical);
    }
}
