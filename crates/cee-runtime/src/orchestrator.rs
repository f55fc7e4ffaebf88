//! Evaluation orchestrator.
//!
//! One run moves a record through
//! `pending -> in_progress -> {completed, needs_human_review, failed}`:
//! 1. Tier 1 rule check, persisted
//! 2. Tier 2 judge call under a timeout, persisted
//! 3. Review policy; escalated runs are queued for a human
//! 4. Trust score without tier 3, persisted with the final status
//! 5. Trust score recorded as a drift sample and checked for drift
//!
//! A failure after the record exists marks it `failed`. Tier outcomes
//! persisted before the failure stay on the record.
//!
//! No lock is held across the judge await, so concurrent runs only contend
//! on the short critical sections of the store, review queue and drift log.

use std::sync::Arc;
use std::time::Duration;

use cee_core::{
    ConfigError, DriftAlert, DriftMonitor, EvaluationInput, EvaluationRecord, EvaluationResult,
    EvaluationStatus, PatternRuleChecker, QueueStatus, ReviewCoordinator, ReviewPolicy,
    ReviewRequest, RuleChecker, SampleTags, Severity, TrustScoreCalculator, TRUST_SCORE_METRIC,
};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;

use crate::config::RuntimeConfig;
use crate::dashboard::DashboardMetrics;
use crate::judge::{CachedJudge, JudgeClient, JudgeError, LlmJudge};
use crate::providers::ProviderRegistry;
use crate::store::{EvaluationStore, InMemoryStore, StoreError};

/// Why an orchestrator call failed.
#[derive(Error, Debug)]
pub enum RunError {
    /// Bad weights, unsupported provider, missing collaborator
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Caller error: unknown id, invalid verdict, wrong state. Nothing changed.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Judge failed for evaluation {evaluation_id}: {source}")]
    Judge {
        evaluation_id: String,
        #[source]
        source: JudgeError,
    },

    #[error("Evaluation {evaluation_id} failed: {message}")]
    Run {
        evaluation_id: String,
        message: String,
    },
}

impl RunError {
    /// Whether retrying the same call later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RunError::Judge { source, .. } => source.is_transient(),
            RunError::Configuration(_) | RunError::Validation(_) | RunError::Run { .. } => false,
        }
    }

    /// Evaluation the failure belongs to, when a record was created.
    pub fn evaluation_id(&self) -> Option<&str> {
        match self {
            RunError::Judge { evaluation_id, .. } | RunError::Run { evaluation_id, .. } => {
                Some(evaluation_id)
            }
            RunError::Configuration(_) | RunError::Validation(_) => None,
        }
    }

    fn run(evaluation_id: &str, error: impl std::fmt::Display) -> Self {
        RunError::Run {
            evaluation_id: evaluation_id.to_string(),
            message: error.to_string(),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(e: ConfigError) -> Self {
        RunError::Configuration(e.to_string())
    }
}

/// Drives evaluation runs and exposes the review, drift and query surface.
pub struct EvaluationOrchestrator {
    rules: Arc<dyn RuleChecker>,
    judge: Arc<dyn JudgeClient>,
    calculator: TrustScoreCalculator,
    policy: ReviewPolicy,
    reviews: Arc<ReviewCoordinator>,
    drift: Arc<DriftMonitor>,
    store: Arc<dyn EvaluationStore>,
    judge_timeout: Duration,
    stability_lookback: Duration,
}

impl EvaluationOrchestrator {
    pub fn builder() -> EvaluationOrchestratorBuilder {
        EvaluationOrchestratorBuilder::default()
    }

    /// Wire everything from configuration, building the judge provider
    /// through `registry`.
    pub fn from_config(config: RuntimeConfig, registry: &ProviderRegistry) -> Result<Self, RunError> {
        config.validate()?;

        let judge = LlmJudge::from_registry(registry, &config.judge)
            .map_err(|e| RunError::Configuration(e.to_string()))?
            .with_retry(config.retry.clone())
            .with_circuit_breaker(config.circuit_breaker.clone());

        tracing::info!(
            provider = %config.judge.provider,
            model = %config.judge.model,
            cache = config.cache.enabled,
            "Judge configured"
        );

        let judge: Arc<dyn JudgeClient> = if config.cache.enabled {
            Arc::new(CachedJudge::from_config(judge, &config.cache))
        } else {
            Arc::new(judge)
        };

        Self::builder().config(config).judge_arc(judge).build()
    }

    /// Run one evaluation end to end.
    pub async fn evaluate(&self, input: EvaluationInput) -> Result<EvaluationResult, RunError> {
        let record = EvaluationRecord::new(input.clone());
        let id = record.id().to_string();

        self.store
            .insert(record)
            .map_err(|e| RunError::run(&id, e))?;
        self.store
            .update(&id, &mut |r| Ok(r.transition(EvaluationStatus::InProgress)?))
            .map_err(|e| RunError::run(&id, e))?;

        tracing::info!(
            evaluation_id = %id,
            run_id = %input.run_id,
            model = %input.model_name,
            "Evaluation started"
        );

        match self.run_tiers(&id, &input).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(evaluation_id = %id, error = %e, recoverable = e.is_recoverable(), "Evaluation failed");
                if let Err(mark) = self
                    .store
                    .update(&id, &mut |r| Ok(r.transition(EvaluationStatus::Failed)?))
                {
                    tracing::error!(evaluation_id = %id, error = %mark, "Could not mark evaluation failed");
                }
                Err(e)
            }
        }
    }

    /// Evaluate many inputs with at most `concurrency` runs in flight.
    /// Results come back in input order; one failed run does not stop the
    /// others.
    pub async fn evaluate_batch(
        &self,
        inputs: Vec<EvaluationInput>,
        concurrency: usize,
    ) -> Vec<Result<EvaluationResult, RunError>> {
        tracing::info!(count = inputs.len(), concurrency, "Batch evaluation started");
        stream::iter(inputs)
            .map(|input| self.evaluate(input))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn run_tiers(
        &self,
        id: &str,
        input: &EvaluationInput,
    ) -> Result<EvaluationResult, RunError> {
        let reference = input.reference.as_deref();

        let tier1 = self.rules.check(&input.output, reference);
        tracing::info!(
            evaluation_id = %id,
            passed = tier1.passed,
            pii = tier1.pii_detected,
            profanity = tier1.profanity_detected,
            tokens = tier1.token_count,
            "Tier 1 complete"
        );
        self.persist(id, |r| r.tier1 = Some(tier1.clone()))?;

        let judged = tokio::time::timeout(
            self.judge_timeout,
            self.judge.judge(&input.prompt, &input.output, reference),
        )
        .await;
        let tier2 = match judged {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(source)) => {
                return Err(RunError::Judge {
                    evaluation_id: id.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(RunError::Judge {
                    evaluation_id: id.to_string(),
                    source: JudgeError::Timeout(self.judge_timeout),
                })
            }
        };
        tracing::info!(
            evaluation_id = %id,
            overall = tier2.overall_score,
            uncertain = tier2.uncertainty_flag,
            judge = %tier2.judge_model,
            "Tier 2 complete"
        );
        self.persist(id, |r| r.tier2 = Some(tier2.clone()))?;

        let decision = self.policy.needs_review(
            tier1.passed,
            tier2.uncertainty_flag,
            tier2.overall_score,
            tier2.safety_score(),
        );
        let status = if decision.required {
            EvaluationStatus::NeedsHumanReview
        } else {
            EvaluationStatus::Completed
        };

        let trust = self.calculator.calculate(&tier1, &tier2, None);
        let record = self
            .store
            .update(id, &mut |r| {
                r.trust_score = Some(trust.clone());
                r.transition(status)?;
                Ok(())
            })
            .map_err(|e| RunError::run(id, e))?;

        // Queue only once the record is reviewable, so a reviewer can never
        // dequeue a run that is still in progress.
        if let Some(reason) = decision.reason {
            self.reviews
                .enqueue(id, reason.as_str(), self.policy.priority(tier1.passed));
        }

        let tags = SampleTags::new(
            Some(input.model_name.clone()),
            input.dataset_name.clone(),
        );
        self.drift
            .record(TRUST_SCORE_METRIC, trust.overall, tags.clone(), None);
        let drift_alert = self
            .drift
            .check_drift(TRUST_SCORE_METRIC, trust.overall, &tags.as_filter());

        tracing::info!(
            evaluation_id = %id,
            status = %record.status(),
            trust_score = trust.overall,
            drift_alert = drift_alert.is_some(),
            "Evaluation finished"
        );

        Ok(record.to_result(drift_alert))
    }

    fn persist(&self, id: &str, mut apply: impl FnMut(&mut EvaluationRecord)) -> Result<(), RunError> {
        self.store
            .update(id, &mut |r| {
                apply(r);
                r.touch();
                Ok(())
            })
            .map(|_| ())
            .map_err(|e| RunError::run(id, e))
    }

    /// Record a human verdict and recompute the trust score with tier 3.
    ///
    /// Accepted for records awaiting review or already completed. An
    /// unknown id, a record in any other state or an invalid verdict is a
    /// validation error and leaves everything untouched. The review queue
    /// only learns of the verdict after the record update has committed.
    pub fn submit_review(
        &self,
        evaluation_id: &str,
        reviewer_id: &str,
        verdict: &str,
        notes: &str,
        corrected_output: Option<String>,
    ) -> Result<EvaluationResult, RunError> {
        let record = self
            .store
            .get(evaluation_id)
            .ok_or_else(|| RunError::Validation(format!("Unknown evaluation id: {evaluation_id}")))?;
        ensure_reviewable(&record)?;

        let tier3 =
            ReviewCoordinator::prepare_review(reviewer_id, verdict, notes, corrected_output)
                .map_err(|e| RunError::Validation(e.to_string()))?;

        let calculator = &self.calculator;
        let updated = self
            .store
            .update(evaluation_id, &mut |r| {
                let (Some(tier1), Some(tier2)) = (&r.tier1, &r.tier2) else {
                    return Err(StoreError::Rejected {
                        evaluation_id: r.id().to_string(),
                        reason: "tier outcomes missing".to_string(),
                    });
                };
                r.trust_score = Some(calculator.calculate(tier1, tier2, Some(&tier3)));
                r.tier3 = Some(tier3.clone());
                if r.status() == EvaluationStatus::NeedsHumanReview {
                    r.transition(EvaluationStatus::Completed)?;
                } else {
                    r.touch();
                }
                Ok(())
            })
            .map_err(|e| RunError::run(evaluation_id, e))?;
        self.reviews.record_review(evaluation_id, tier3.clone());

        tracing::info!(
            evaluation_id,
            verdict = %tier3.verdict,
            trust_score = updated.trust_score.as_ref().map(|s| s.overall),
            "Review applied"
        );
        Ok(updated.to_result(None))
    }

    pub fn get(&self, evaluation_id: &str) -> Option<EvaluationResult> {
        self.store.get(evaluation_id).map(|r| r.to_result(None))
    }

    pub fn by_run(&self, run_id: &str) -> Vec<EvaluationResult> {
        self.store
            .by_run(run_id)
            .iter()
            .map(|r| r.to_result(None))
            .collect()
    }

    /// Pending review requests in dequeue order.
    pub fn pending_reviews(&self) -> Vec<ReviewRequest> {
        self.reviews.pending()
    }

    /// Take the highest-priority pending review.
    pub fn next_review(&self) -> Option<ReviewRequest> {
        self.reviews.dequeue()
    }

    pub fn review_queue_status(&self) -> QueueStatus {
        self.reviews.queue_status()
    }

    pub fn recent_alerts(&self, window: Duration, severity: Option<Severity>) -> Vec<DriftAlert> {
        self.drift.recent_alerts(window, severity)
    }

    pub fn acknowledge_alert(&self, alert_id: &str) -> Result<DriftAlert, RunError> {
        self.drift
            .acknowledge(alert_id)
            .map_err(|e| RunError::Validation(e.to_string()))
    }

    /// Aggregate figures for runs created within `window`.
    pub fn dashboard(&self, window: Duration) -> DashboardMetrics {
        let since = chrono::Duration::from_std(window)
            .ok()
            .and_then(|w| Utc::now().checked_sub_signed(w))
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        let records = self.store.created_since(since);
        DashboardMetrics::compute(&records, &self.drift, window, self.stability_lookback)
    }

    /// Confidence bounds around a stored trust score.
    pub fn confidence_interval(&self, evaluation_id: &str) -> Option<(f64, f64)> {
        let record = self.store.get(evaluation_id)?;
        let score = record.trust_score.as_ref()?;
        let uncertain = record.tier2.as_ref().is_some_and(|t| t.uncertainty_flag);
        Some(self.calculator.confidence_interval(score, uncertain))
    }

    pub fn review_coordinator(&self) -> &Arc<ReviewCoordinator> {
        &self.reviews
    }

    pub fn drift_monitor(&self) -> &Arc<DriftMonitor> {
        &self.drift
    }
}

fn ensure_reviewable(record: &EvaluationRecord) -> Result<(), RunError> {
    match record.status() {
        EvaluationStatus::NeedsHumanReview | EvaluationStatus::Completed => Ok(()),
        other => Err(RunError::Validation(format!(
            "Evaluation {} is {}, a review cannot be applied",
            record.id(),
            other
        ))),
    }
}

/// Builder wiring the orchestrator's collaborators. Only the judge is
/// required; everything else falls back to configured defaults.
#[derive(Default)]
pub struct EvaluationOrchestratorBuilder {
    config: Option<RuntimeConfig>,
    rules: Option<Arc<dyn RuleChecker>>,
    judge: Option<Arc<dyn JudgeClient>>,
    store: Option<Arc<dyn EvaluationStore>>,
    reviews: Option<Arc<ReviewCoordinator>>,
    drift: Option<Arc<DriftMonitor>>,
}

impl EvaluationOrchestratorBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn rule_checker(mut self, rules: impl RuleChecker + 'static) -> Self {
        self.rules = Some(Arc::new(rules));
        self
    }

    pub fn judge(mut self, judge: impl JudgeClient + 'static) -> Self {
        self.judge = Some(Arc::new(judge));
        self
    }

    pub fn judge_arc(mut self, judge: Arc<dyn JudgeClient>) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn store(mut self, store: Arc<dyn EvaluationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share a review queue with other orchestrators.
    pub fn review_coordinator(mut self, reviews: Arc<ReviewCoordinator>) -> Self {
        self.reviews = Some(reviews);
        self
    }

    pub fn drift_monitor(mut self, drift: Arc<DriftMonitor>) -> Self {
        self.drift = Some(drift);
        self
    }

    pub fn build(self) -> Result<EvaluationOrchestrator, RunError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let judge = self
            .judge
            .ok_or_else(|| RunError::Configuration("no judge client configured".to_string()))?;
        let calculator = TrustScoreCalculator::new(config.core.weights)?;

        Ok(EvaluationOrchestrator {
            rules: self
                .rules
                .unwrap_or_else(|| Arc::new(PatternRuleChecker::new(config.core.token_limit))),
            judge,
            calculator,
            policy: ReviewPolicy,
            reviews: self.reviews.unwrap_or_default(),
            drift: self
                .drift
                .unwrap_or_else(|| Arc::new(DriftMonitor::from_config(&config.core))),
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryStore::new())),
            judge_timeout: config.judge.timeout,
            stability_lookback: config.core.stability_lookback,
        })
    }
}

impl std::fmt::Debug for EvaluationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationOrchestrator")
            .field("judge", &self.judge.model())
            .field("weights", &self.calculator.weights())
            .field("judge_timeout", &self.judge_timeout)
            .finish()
    }
}
