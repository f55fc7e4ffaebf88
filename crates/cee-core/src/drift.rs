//! Drift monitoring.
//!
//! Keeps an append-only log of metric samples and the alerts raised against
//! them. A drift check compares a current value with the mean of recent
//! samples (the baseline) and raises an alert when either the absolute or
//! the relative change reaches its threshold.
//!
//! Both logs sit behind read-write locks so every read works on one
//! consistent snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{CoreConfig, DriftThresholds};
use crate::types::{DriftAlert, DriftSample, Severity};

/// Stability index reported when there is not enough data to measure spread.
pub const MAX_STABILITY: f64 = 100.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriftError {
    #[error("Drift alert not found: {0}")]
    UnknownAlert(String),
}

/// Tags attached to a recorded sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleTags {
    pub model_name: Option<String>,
    pub dataset_name: Option<String>,
}

impl SampleTags {
    pub fn new(model_name: Option<String>, dataset_name: Option<String>) -> Self {
        Self {
            model_name,
            dataset_name,
        }
    }

    pub fn model(model_name: impl Into<String>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            dataset_name: None,
        }
    }

    /// A filter matching exactly these tags.
    pub fn as_filter(&self) -> SampleFilter<'_> {
        SampleFilter {
            model_name: self.model_name.as_deref(),
            dataset_name: self.dataset_name.as_deref(),
        }
    }
}

/// Restricts which samples take part in a baseline. `None` matches anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SampleFilter<'a> {
    pub model_name: Option<&'a str>,
    pub dataset_name: Option<&'a str>,
}

impl<'a> SampleFilter<'a> {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn model(model_name: &'a str) -> Self {
        Self {
            model_name: Some(model_name),
            dataset_name: None,
        }
    }

    fn matches(&self, sample: &DriftSample) -> bool {
        let model_ok = self
            .model_name
            .map_or(true, |m| sample.model_name.as_deref() == Some(m));
        let dataset_ok = self
            .dataset_name
            .map_or(true, |d| sample.dataset_name.as_deref() == Some(d));
        model_ok && dataset_ok
    }
}

/// Time-series recorder, baseline estimator and alerting.
#[derive(Debug)]
pub struct DriftMonitor {
    thresholds: DriftThresholds,
    baseline_lookback: Duration,
    samples: RwLock<Vec<DriftSample>>,
    alerts: RwLock<Vec<DriftAlert>>,
}

impl Default for DriftMonitor {
    fn default() -> Self {
        let config = CoreConfig::default();
        Self::new(config.drift, config.baseline_lookback)
    }
}

impl DriftMonitor {
    pub fn new(thresholds: DriftThresholds, baseline_lookback: Duration) -> Self {
        Self {
            thresholds,
            baseline_lookback,
            samples: RwLock::new(Vec::new()),
            alerts: RwLock::new(Vec::new()),
        }
    }

    pub fn from_config(config: &CoreConfig) -> Self {
        Self::new(config.drift, config.baseline_lookback)
    }

    pub fn thresholds(&self) -> DriftThresholds {
        self.thresholds
    }

    /// Append a sample stamped with the current time.
    pub fn record(
        &self,
        metric_name: &str,
        value: f64,
        tags: SampleTags,
        baseline_value: Option<f64>,
    ) -> DriftSample {
        self.record_at(metric_name, value, tags, baseline_value, Utc::now())
    }

    /// Append a sample with an explicit timestamp.
    pub fn record_at(
        &self,
        metric_name: &str,
        value: f64,
        tags: SampleTags,
        baseline_value: Option<f64>,
        recorded_at: DateTime<Utc>,
    ) -> DriftSample {
        let sample = DriftSample {
            metric_name: metric_name.to_string(),
            value,
            baseline_value,
            model_name: tags.model_name,
            dataset_name: tags.dataset_name,
            recorded_at,
        };
        self.samples.write().push(sample.clone());
        tracing::debug!(metric = metric_name, value, "Recorded drift sample");
        sample
    }

    /// Every sample recorded for `metric_name`, oldest first.
    pub fn samples(&self, metric_name: &str) -> Vec<DriftSample> {
        let samples = self.samples.read();
        let mut matching: Vec<DriftSample> = samples
            .iter()
            .filter(|s| s.metric_name == metric_name)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.recorded_at);
        matching
    }

    /// Mean of the matching samples recorded within `lookback`, or `None`
    /// when there are none.
    pub fn baseline(
        &self,
        metric_name: &str,
        lookback: Duration,
        filter: &SampleFilter<'_>,
    ) -> Option<f64> {
        let values = self.window_values(metric_name, cutoff(Utc::now(), lookback), filter);
        if values.is_empty() {
            return None;
        }
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }

    /// Compare `current_value` with the baseline over the configured lookback.
    ///
    /// Returns the persisted alert when a threshold is reached, and `None`
    /// when there is no drift or not enough data for a baseline.
    pub fn check_drift(
        &self,
        metric_name: &str,
        current_value: f64,
        filter: &SampleFilter<'_>,
    ) -> Option<DriftAlert> {
        let baseline = self.baseline(metric_name, self.baseline_lookback, filter)?;

        let absolute_change = (current_value - baseline).abs();
        let relative_change = if baseline == 0.0 {
            0.0
        } else {
            absolute_change / baseline
        };

        let t = self.thresholds;
        if absolute_change < t.absolute && relative_change < t.relative {
            return None;
        }

        let severity = if absolute_change >= 2.0 * t.absolute || relative_change >= 2.0 * t.relative
        {
            Severity::Critical
        } else {
            Severity::Warning
        };

        let alert = DriftAlert {
            alert_id: Uuid::new_v4().to_string(),
            metric_name: metric_name.to_string(),
            current_value,
            baseline_value: baseline,
            absolute_change,
            relative_change,
            severity,
            message: format!(
                "Drift detected for {}: current={:.2}, baseline={:.2}, change={:.2} ({:.1}%)",
                metric_name,
                current_value,
                baseline,
                absolute_change,
                relative_change * 100.0
            ),
            triggered_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        };

        match severity {
            Severity::Critical => tracing::warn!(
                alert_id = %alert.alert_id,
                metric = metric_name,
                current_value,
                baseline,
                "{}",
                alert.message
            ),
            Severity::Warning => tracing::info!(
                alert_id = %alert.alert_id,
                metric = metric_name,
                current_value,
                baseline,
                "{}",
                alert.message
            ),
        }

        self.alerts.write().push(alert.clone());
        Some(alert)
    }

    /// Drift Stability Index: `100 · e^(−cv)` over the matching samples,
    /// where `cv` is the population coefficient of variation. Fewer than two
    /// samples yields 100.
    pub fn stability_index(
        &self,
        metric_name: &str,
        lookback: Duration,
        model_name: Option<&str>,
    ) -> f64 {
        let filter = SampleFilter {
            model_name,
            dataset_name: None,
        };
        let values = self.window_values(metric_name, cutoff(Utc::now(), lookback), &filter);
        stability_of(&values)
    }

    /// Alerts triggered within `window`, newest first.
    pub fn recent_alerts(&self, window: Duration, severity: Option<Severity>) -> Vec<DriftAlert> {
        let since = cutoff(Utc::now(), window);
        let alerts = self.alerts.read();
        let mut recent: Vec<DriftAlert> = alerts
            .iter()
            .filter(|a| a.triggered_at >= since)
            .filter(|a| severity.map_or(true, |s| a.severity == s))
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        recent
    }

    /// Mark an alert acknowledged. Acknowledging twice keeps the first
    /// acknowledgment time.
    pub fn acknowledge(&self, alert_id: &str) -> Result<DriftAlert, DriftError> {
        let mut alerts = self.alerts.write();
        let alert = alerts
            .iter_mut()
            .find(|a| a.alert_id == alert_id)
            .ok_or_else(|| DriftError::UnknownAlert(alert_id.to_string()))?;

        if !alert.acknowledged {
            alert.acknowledged = true;
            alert.acknowledged_at = Some(Utc::now());
            tracing::info!(alert_id, "Drift alert acknowledged");
        }
        Ok(alert.clone())
    }

    fn window_values(
        &self,
        metric_name: &str,
        since: DateTime<Utc>,
        filter: &SampleFilter<'_>,
    ) -> Vec<f64> {
        self.samples
            .read()
            .iter()
            .filter(|s| s.metric_name == metric_name && s.recorded_at >= since)
            .filter(|s| filter.matches(s))
            .map(|s| s.value)
            .collect()
    }
}

fn cutoff(now: DateTime<Utc>, lookback: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(lookback)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn stability_of(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return MAX_STABILITY;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let cv = if mean == 0.0 {
        0.0
    } else {
        variance.sqrt() / mean
    };
    (MAX_STABILITY * (-cv).exp() * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

    fn monitor() -> DriftMonitor {
        DriftMonitor::new(DriftThresholds::default(), WEEK)
    }

    #[test]
    fn test_baseline_none_without_samples() {
        let m = monitor();
        assert_eq!(m.baseline("trust_score", WEEK, &SampleFilter::any()), None);
        assert!(m.check_drift("trust_score", 50.0, &SampleFilter::any()).is_none());
    }

    #[test]
    fn test_baseline_respects_lookback_and_filter() {
        let m = monitor();
        let old = Utc::now() - chrono::Duration::days(10);
        m.record_at("trust_score", 10.0, SampleTags::model("a"), None, old);
        m.record("trust_score", 80.0, SampleTags::model("a"), None);
        m.record("trust_score", 90.0, SampleTags::model("b"), None);
        m.record("other", 1.0, SampleTags::default(), None);

        assert_eq!(m.baseline("trust_score", WEEK, &SampleFilter::any()), Some(85.0));
        assert_eq!(m.baseline("trust_score", WEEK, &SampleFilter::model("a")), Some(80.0));
        assert_eq!(m.baseline("trust_score", WEEK, &SampleFilter::model("c")), None);
    }

    #[test]
    fn test_absolute_threshold_is_inclusive() {
        let m = monitor();
        m.record("trust_score", 100.0, SampleTags::default(), None);

        // 5 points, 5%: absolute threshold met exactly
        let alert = m
            .check_drift("trust_score", 95.0, &SampleFilter::any())
            .unwrap();
        assert_eq!(alert.severity, Severity::Warning);
        assert_eq!(alert.absolute_change, 5.0);

        assert!(m.check_drift("trust_score", 96.0, &SampleFilter::any()).is_none());
    }

    #[test]
    fn test_relative_threshold_alone_triggers() {
        let m = monitor();
        m.record("latency", 20.0, SampleTags::default(), None);

        // 3 points is under the absolute threshold, 15% is over the relative one
        let alert = m.check_drift("latency", 23.0, &SampleFilter::any()).unwrap();
        assert_eq!(alert.severity, Severity::Warning);
    }

    #[test]
    fn test_critical_severity_and_message() {
        let m = monitor();
        m.record("trust_score", 80.0, SampleTags::default(), None);

        let alert = m.check_drift("trust_score", 60.0, &SampleFilter::any()).unwrap();
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(
            alert.message,
            "Drift detected for trust_score: current=60.00, baseline=80.00, change=20.00 (25.0%)"
        );
        assert!(!alert.acknowledged);
        assert_eq!(m.recent_alerts(WEEK, None).len(), 1);
    }

    #[test]
    fn test_zero_baseline_relative_change() {
        let m = monitor();
        m.record("errors", 0.0, SampleTags::default(), None);

        assert!(m.check_drift("errors", 4.0, &SampleFilter::any()).is_none());
        let alert = m.check_drift("errors", 6.0, &SampleFilter::any()).unwrap();
        assert_eq!(alert.relative_change, 0.0);
    }

    #[test]
    fn test_stability_index() {
        let m = monitor();
        assert_eq!(m.stability_index("trust_score", WEEK, None), 100.0);

        m.record("trust_score", 50.0, SampleTags::default(), None);
        assert_eq!(m.stability_index("trust_score", WEEK, None), 100.0);

        m.record("trust_score", 50.0, SampleTags::default(), None);
        m.record("trust_score", 50.0, SampleTags::default(), None);
        assert_eq!(m.stability_index("trust_score", WEEK, None), 100.0);

        m.record("dispersed", 10.0, SampleTags::default(), None);
        m.record("dispersed", 90.0, SampleTags::default(), None);
        let dsi = m.stability_index("dispersed", WEEK, None);
        assert!(dsi < 100.0 && dsi > 0.0);
    }

    #[test]
    fn test_stability_formula() {
        // mean 50, population stddev 40, cv 0.8
        let expected = ((100.0 * (-0.8f64).exp()) * 100.0).round() / 100.0;
        assert_eq!(stability_of(&[10.0, 90.0]), expected);
        assert_eq!(stability_of(&[0.0, 0.0]), 100.0);
    }

    #[test]
    fn test_recent_alerts_filter_and_order() {
        let m = monitor();
        m.record("a", 100.0, SampleTags::default(), None);
        m.record("b", 100.0, SampleTags::default(), None);

        let warning = m.check_drift("a", 94.0, &SampleFilter::any()).unwrap();
        let critical = m.check_drift("b", 50.0, &SampleFilter::any()).unwrap();

        let all = m.recent_alerts(WEEK, None);
        assert_eq!(all.len(), 2);
        assert!(all[0].triggered_at >= all[1].triggered_at);

        let critical_only = m.recent_alerts(WEEK, Some(Severity::Critical));
        assert_eq!(critical_only.len(), 1);
        assert_eq!(critical_only[0].alert_id, critical.alert_id);

        let warnings = m.recent_alerts(WEEK, Some(Severity::Warning));
        assert_eq!(warnings[0].alert_id, warning.alert_id);
    }

    #[test]
    fn test_acknowledge_is_one_way() {
        let m = monitor();
        m.record("a", 100.0, SampleTags::default(), None);
        let alert = m.check_drift("a", 50.0, &SampleFilter::any()).unwrap();

        let first = m.acknowledge(&alert.alert_id).unwrap();
        assert!(first.acknowledged);
        let acknowledged_at = first.acknowledged_at;
        assert!(acknowledged_at.is_some());

        let second = m.acknowledge(&alert.alert_id).unwrap();
        assert_eq!(second.acknowledged_at, acknowledged_at);

        assert!(matches!(
            m.acknowledge("missing"),
            Err(DriftError::UnknownAlert(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_samples_are_append_only_snapshots() {
        let m = monitor();
        let tags = SampleTags::new(Some("gpt".into()), Some("qa".into()));
        m.record("trust_score", 70.0, tags.clone(), Some(75.0));
        m.record("trust_score", 72.0, tags, None);

        let samples = m.samples("trust_score");
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].baseline_value, Some(75.0));
        assert_eq!(samples[1].dataset_name.as_deref(), Some("qa"));
    }
}
