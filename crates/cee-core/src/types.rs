//! Core data model for CEE evaluations.
//!
//! These types flow between the tiers, the trust score calculator, the
//! review coordinator and the drift monitor. They are plain serde structs so
//! the persistence and transport layers can store them as-is.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::review::ReviewError;

/// Lifecycle state of an evaluation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    InProgress,
    Completed,
    NeedsHumanReview,
    Failed,
}

impl EvaluationStatus {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// | From | To |
    /// |------|----|
    /// | pending | in_progress |
    /// | in_progress | completed, needs_human_review, failed |
    /// | needs_human_review | completed |
    pub fn can_transition_to(self, next: EvaluationStatus) -> bool {
        use EvaluationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Completed)
                | (InProgress, NeedsHumanReview)
                | (InProgress, Failed)
                | (NeedsHumanReview, Completed)
        )
    }

    /// Completed and failed records never change status again.
    pub fn is_terminal(self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "pending",
            EvaluationStatus::InProgress => "in_progress",
            EvaluationStatus::Completed => "completed",
            EvaluationStatus::NeedsHumanReview => "needs_human_review",
            EvaluationStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EvaluationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status change on an [`EvaluationRecord`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Illegal status transition for {evaluation_id}: {from} -> {to}")]
pub struct StatusError {
    pub evaluation_id: String,
    pub from: EvaluationStatus,
    pub to: EvaluationStatus,
}

/// What a caller submits for evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationInput {
    /// Groups evaluations belonging to one batch or CI run
    pub run_id: String,

    /// The prompt the evaluated model answered
    pub prompt: String,

    /// The generated text under evaluation
    pub output: String,

    /// Optional reference answer
    #[serde(default)]
    pub reference: Option<String>,

    /// Identity of the model that produced `output`
    pub model_name: String,

    /// Provider label of the evaluated model (e.g. "openai")
    #[serde(default)]
    pub model_provider: Option<String>,

    /// Dataset the prompt came from
    #[serde(default)]
    pub dataset_name: Option<String>,

    /// Free-form caller metadata
    #[serde(default)]
    pub metadata: HashMap<String, JsonValue>,
}

impl EvaluationInput {
    /// Minimal input with only the required fields.
    pub fn new(
        run_id: impl Into<String>,
        prompt: impl Into<String>,
        output: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            prompt: prompt.into(),
            output: output.into(),
            reference: None,
            model_name: model_name.into(),
            model_provider: None,
            dataset_name: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset_name = Some(dataset.into());
        self
    }
}

/// Result of the rule-based checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier1Outcome {
    pub pii_detected: bool,
    pub profanity_detected: bool,
    pub token_count: usize,
    pub token_limit_exceeded: bool,

    /// ROUGE-L F1 against the reference, when one was supplied
    #[serde(default)]
    pub similarity_score: Option<f64>,

    /// Sentence BLEU against the reference, when one was supplied
    #[serde(default)]
    pub bleu_score: Option<f64>,

    /// True iff none of the three failure checks fired
    pub passed: bool,

    #[serde(default)]
    pub details: BTreeMap<String, JsonValue>,
}

impl Tier1Outcome {
    /// Build an outcome, deriving `passed` from the failure flags.
    pub fn new(
        pii_detected: bool,
        profanity_detected: bool,
        token_count: usize,
        token_limit_exceeded: bool,
    ) -> Self {
        Self {
            pii_detected,
            profanity_detected,
            token_count,
            token_limit_exceeded,
            similarity_score: None,
            bleu_score: None,
            passed: !(pii_detected || profanity_detected || token_limit_exceeded),
            details: BTreeMap::new(),
        }
    }

    /// An outcome where every check passed.
    pub fn clean(token_count: usize) -> Self {
        Self::new(false, false, token_count, false)
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity_score = Some(similarity);
        self
    }
}

/// The five dimensions the judge scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeDimension {
    FactualAccuracy,
    SafetyPolicy,
    AlignmentHelpfulness,
    ToneStyle,
    Conciseness,
}

impl JudgeDimension {
    pub const ALL: [JudgeDimension; 5] = [
        JudgeDimension::FactualAccuracy,
        JudgeDimension::SafetyPolicy,
        JudgeDimension::AlignmentHelpfulness,
        JudgeDimension::ToneStyle,
        JudgeDimension::Conciseness,
    ];

    /// Key used in judge responses and in the trust score breakdown.
    pub fn key(self) -> &'static str {
        match self {
            JudgeDimension::FactualAccuracy => "factual_accuracy",
            JudgeDimension::SafetyPolicy => "safety_policy",
            JudgeDimension::AlignmentHelpfulness => "alignment_helpfulness",
            JudgeDimension::ToneStyle => "tone_style",
            JudgeDimension::Conciseness => "conciseness",
        }
    }
}

/// One judged dimension.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionScore {
    /// 1 (poor) to 5 (excellent)
    pub score: u8,
    pub reasoning: String,
}

impl DimensionScore {
    pub fn new(score: u8, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
        }
    }
}

/// A dimension score outside 1..=5.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Score for {dimension} must be between 1 and 5 (got {score})")]
pub struct ScoreRangeError {
    pub dimension: &'static str,
    pub score: u8,
}

/// Result of the LLM judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier2Outcome {
    pub factual_accuracy: DimensionScore,
    pub safety_policy: DimensionScore,
    pub alignment_helpfulness: DimensionScore,
    pub tone_style: DimensionScore,
    pub conciseness: DimensionScore,

    /// Arithmetic mean of the five dimension scores
    pub overall_score: f64,

    pub uncertainty_flag: bool,

    /// Model that acted as judge
    pub judge_model: String,
}

impl Tier2Outcome {
    /// Build an outcome, validating scores and computing the mean.
    pub fn new(
        factual_accuracy: DimensionScore,
        safety_policy: DimensionScore,
        alignment_helpfulness: DimensionScore,
        tone_style: DimensionScore,
        conciseness: DimensionScore,
        uncertainty_flag: bool,
        judge_model: impl Into<String>,
    ) -> Result<Self, ScoreRangeError> {
        let mut outcome = Self {
            factual_accuracy,
            safety_policy,
            alignment_helpfulness,
            tone_style,
            conciseness,
            overall_score: 0.0,
            uncertainty_flag,
            judge_model: judge_model.into(),
        };

        for dimension in JudgeDimension::ALL {
            let score = outcome.dimension(dimension).score;
            if !(1..=5).contains(&score) {
                return Err(ScoreRangeError {
                    dimension: dimension.key(),
                    score,
                });
            }
        }

        let total: u32 = JudgeDimension::ALL
            .iter()
            .map(|d| u32::from(outcome.dimension(*d).score))
            .sum();
        outcome.overall_score = f64::from(total) / 5.0;
        Ok(outcome)
    }

    /// Score every dimension with the same value.
    pub fn uniform(
        score: u8,
        uncertainty_flag: bool,
        judge_model: impl Into<String>,
    ) -> Result<Self, ScoreRangeError> {
        let dim = || DimensionScore::new(score, "uniform");
        Self::new(dim(), dim(), dim(), dim(), dim(), uncertainty_flag, judge_model)
    }

    pub fn dimension(&self, dimension: JudgeDimension) -> &DimensionScore {
        match dimension {
            JudgeDimension::FactualAccuracy => &self.factual_accuracy,
            JudgeDimension::SafetyPolicy => &self.safety_policy,
            JudgeDimension::AlignmentHelpfulness => &self.alignment_helpfulness,
            JudgeDimension::ToneStyle => &self.tone_style,
            JudgeDimension::Conciseness => &self.conciseness,
        }
    }

    pub fn safety_score(&self) -> f64 {
        f64::from(self.safety_policy.score)
    }
}

/// Human reviewer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Approved,
    Rejected,
    NeedsRevision,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Approved => "approved",
            Verdict::Rejected => "rejected",
            Verdict::NeedsRevision => "needs_revision",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = ReviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Verdict::Approved),
            "rejected" => Ok(Verdict::Rejected),
            "needs_revision" => Ok(Verdict::NeedsRevision),
            other => Err(ReviewError::InvalidVerdict(other.to_string())),
        }
    }
}

/// Result of a human review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tier3Outcome {
    pub reviewer_id: String,
    pub verdict: Verdict,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub corrected_output: Option<String>,
    #[serde(default = "Utc::now")]
    pub reviewed_at: DateTime<Utc>,
}

/// Aggregate trust score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrustScore {
    /// 0–100
    pub overall: f64,
    pub tier1_score: f64,
    pub tier2_score: f64,
    #[serde(default)]
    pub tier3_score: Option<f64>,

    /// Weights, weighted contributions and scaled judge dimensions
    pub breakdown: BTreeMap<String, f64>,
}

/// A pending human review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRequest {
    pub evaluation_id: String,
    /// 1 (lowest) to 5 (highest)
    pub priority: u8,
    pub reason: String,
    pub flagged_at: DateTime<Utc>,
}

/// Drift alert severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Critical => f.write_str("critical"),
        }
    }
}

/// One recorded metric value. Never mutated after recording.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftSample {
    pub metric_name: String,
    pub value: f64,
    #[serde(default)]
    pub baseline_value: Option<f64>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub dataset_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// A detected deviation from baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftAlert {
    pub alert_id: String,
    pub metric_name: String,
    pub current_value: f64,
    pub baseline_value: f64,
    pub absolute_change: f64,
    pub relative_change: f64,
    pub severity: Severity,
    pub message: String,
    pub triggered_at: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(default)]
    pub acknowledged_at: Option<DateTime<Utc>>,
}

/// Stored state of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    id: String,
    pub input: EvaluationInput,
    status: EvaluationStatus,
    pub tier1: Option<Tier1Outcome>,
    pub tier2: Option<Tier2Outcome>,
    pub tier3: Option<Tier3Outcome>,
    pub trust_score: Option<TrustScore>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationRecord {
    /// Create a fresh `pending` record with a new unique id.
    pub fn new(input: EvaluationInput) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            status: EvaluationStatus::Pending,
            tier1: None,
            tier2: None,
            tier3: None,
            trust_score: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> EvaluationStatus {
        self.status
    }

    /// Move to `next`, rejecting anything but a forward transition.
    pub fn transition(&mut self, next: EvaluationStatus) -> Result<(), StatusError> {
        if !self.status.can_transition_to(next) {
            return Err(StatusError {
                evaluation_id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        tracing::debug!(evaluation_id = %self.id, from = %self.status, to = %next, "Status transition");
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Compose the caller-facing view of this record.
    pub fn to_result(&self, drift_alert: Option<DriftAlert>) -> EvaluationResult {
        EvaluationResult {
            evaluation_id: self.id.clone(),
            run_id: self.input.run_id.clone(),
            status: self.status,
            tier1: self.tier1.clone(),
            tier2: self.tier2.clone(),
            tier3: self.tier3.clone(),
            trust_score: self.trust_score.clone(),
            drift_alert,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Composed result returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub evaluation_id: String,
    pub run_id: String,
    pub status: EvaluationStatus,
    pub tier1: Option<Tier1Outcome>,
    pub tier2: Option<Tier2Outcome>,
    pub tier3: Option<Tier3Outcome>,
    pub trust_score: Option<TrustScore>,

    /// Drift alert raised while recording this run's score, if any
    #[serde(default)]
    pub drift_alert: Option<DriftAlert>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
