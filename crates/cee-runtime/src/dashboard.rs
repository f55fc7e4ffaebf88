//! Aggregate figures for monitoring over a trailing window.

use std::time::Duration;

use cee_core::{DriftMonitor, EvaluationRecord, Severity, TRUST_SCORE_METRIC};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub total_evaluations: usize,

    /// Mean overall trust score of the scored runs, 0-100
    pub average_trust_score: f64,

    /// Percentage of runs whose tier 1 check passed
    pub tier1_pass_rate: f64,

    /// Mean tier 2 sub-score, 0-100
    pub tier2_average_score: f64,

    pub tier3_review_count: usize,

    /// Drift Stability Index of the trust score series
    pub drift_stability_index: f64,

    pub recent_alerts_count: usize,
    pub critical_alerts_count: usize,
}

impl DashboardMetrics {
    /// Aggregate `records` (already restricted to the window) and the drift
    /// state. Alerts are counted over `window`; the stability index uses
    /// `stability_lookback`.
    pub fn compute(
        records: &[EvaluationRecord],
        drift: &DriftMonitor,
        window: Duration,
        stability_lookback: Duration,
    ) -> Self {
        let total = records.len();
        let scores: Vec<_> = records.iter().filter_map(|r| r.trust_score.as_ref()).collect();

        let tier1_passed = records
            .iter()
            .filter(|r| r.tier1.as_ref().is_some_and(|t| t.passed))
            .count();
        let tier1_pass_rate = if total == 0 {
            0.0
        } else {
            tier1_passed as f64 / total as f64 * 100.0
        };

        Self {
            total_evaluations: total,
            average_trust_score: round2(mean(scores.iter().map(|s| s.overall))),
            tier1_pass_rate: round2(tier1_pass_rate),
            tier2_average_score: round2(mean(scores.iter().map(|s| s.tier2_score))),
            tier3_review_count: records.iter().filter(|r| r.tier3.is_some()).count(),
            drift_stability_index: drift.stability_index(
                TRUST_SCORE_METRIC,
                stability_lookback,
                None,
            ),
            recent_alerts_count: drift.recent_alerts(window, None).len(),
            critical_alerts_count: drift.recent_alerts(window, Some(Severity::Critical)).len(),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use cee_core::{
        EvaluationInput, SampleFilter, SampleTags, Tier1Outcome, Tier2Outcome, TrustScore,
        TrustScoreCalculator,
    };

    const DAY: Duration = Duration::from_secs(86_400);

    fn scored(passed: bool, judge: u8) -> (EvaluationRecord, TrustScore) {
        let mut record =
            EvaluationRecord::new(EvaluationInput::new("run", "prompt", "output", "model"));
        let tier1 = if passed {
            Tier1Outcome::clean(10)
        } else {
            Tier1Outcome::new(true, false, 10, false)
        };
        let tier2 = Tier2Outcome::uniform(judge, false, "judge").unwrap();
        let score = TrustScoreCalculator::default().calculate(&tier1, &tier2, None);
        record.tier1 = Some(tier1);
        record.tier2 = Some(tier2);
        record.trust_score = Some(score.clone());
        (record, score)
    }

    #[test]
    fn test_empty_window() {
        let metrics = DashboardMetrics::compute(&[], &DriftMonitor::default(), DAY, DAY);
        assert_eq!(metrics.total_evaluations, 0);
        assert_eq!(metrics.average_trust_score, 0.0);
        assert_eq!(metrics.tier1_pass_rate, 0.0);
        assert_eq!(metrics.tier2_average_score, 0.0);
        assert_eq!(metrics.drift_stability_index, 100.0);
        assert_eq!(metrics.recent_alerts_count, 0);
    }

    #[test]
    fn test_aggregates() {
        let (a, score_a) = scored(true, 5);
        let (b, score_b) = scored(false, 3);

        let metrics = DashboardMetrics::compute(&[a, b], &DriftMonitor::default(), DAY, DAY);
        assert_eq!(metrics.total_evaluations, 2);
        assert_eq!(metrics.tier1_pass_rate, 50.0);
        assert_eq!(
            metrics.average_trust_score,
            round2((score_a.overall + score_b.overall) / 2.0)
        );
        assert_eq!(metrics.tier2_average_score, 80.0);
        assert_eq!(metrics.tier3_review_count, 0);
    }

    #[test]
    fn test_alert_counts() {
        let drift = DriftMonitor::default();
        for _ in 0..3 {
            drift.record(TRUST_SCORE_METRIC, 90.0, SampleTags::default(), None);
        }
        let alert = drift
            .check_drift(TRUST_SCORE_METRIC, 50.0, &SampleFilter::any())
            .unwrap();
        assert_eq!(alert.severity, Severity::Critical);

        let metrics = DashboardMetrics::compute(&[], &drift, DAY, DAY);
        assert_eq!(metrics.recent_alerts_count, 1);
        assert_eq!(metrics.critical_alerts_count, 1);
        assert_eq!(metrics.drift_stability_index, 100.0);
    }
}
