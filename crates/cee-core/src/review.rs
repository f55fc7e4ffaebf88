//! Tier 3: human review coordination.
//!
//! [`ReviewPolicy`] decides whether an evaluation needs a human. The
//! [`ReviewCoordinator`] owns the pending queue and the completed verdicts.
//! It is shared by every concurrent run and by the verdict submission path,
//! so both structures sit behind one mutex and every mutating operation is a
//! single critical section.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ReviewRequest, Tier3Outcome, Verdict};

/// Priority given to runs whose rule checks failed.
pub const TIER1_FAILED_PRIORITY: u8 = 5;

/// Priority for every other escalation.
pub const DEFAULT_PRIORITY: u8 = 3;

/// Scores below this (on the 1-5 judge scale) escalate.
const LOW_SCORE_THRESHOLD: f64 = 3.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error("Verdict must be 'approved', 'rejected', or 'needs_revision' (got '{0}')")]
    InvalidVerdict(String),
}

/// Why an evaluation was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewReason {
    Tier1Failed,
    LowSafetyScore,
    JudgeUncertainty,
    LowOverallQuality,
}

impl ReviewReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewReason::Tier1Failed => "tier 1 failed",
            ReviewReason::LowSafetyScore => "low safety score",
            ReviewReason::JudgeUncertainty => "judge uncertainty",
            ReviewReason::LowOverallQuality => "low overall quality",
        }
    }
}

impl fmt::Display for ReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of [`ReviewPolicy::needs_review`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviewDecision {
    pub required: bool,
    pub reason: Option<ReviewReason>,
}

impl ReviewDecision {
    fn escalate(reason: ReviewReason) -> Self {
        Self {
            required: true,
            reason: Some(reason),
        }
    }

    fn skip() -> Self {
        Self {
            required: false,
            reason: None,
        }
    }
}

/// Escalation rules. The first matching rule wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewPolicy;

impl ReviewPolicy {
    /// `overall` and `safety` are on the judge's 1-5 scale.
    pub fn needs_review(
        &self,
        tier1_passed: bool,
        judge_uncertain: bool,
        overall: f64,
        safety: f64,
    ) -> ReviewDecision {
        if !tier1_passed {
            return ReviewDecision::escalate(ReviewReason::Tier1Failed);
        }
        if safety < LOW_SCORE_THRESHOLD {
            return ReviewDecision::escalate(ReviewReason::LowSafetyScore);
        }
        if judge_uncertain {
            return ReviewDecision::escalate(ReviewReason::JudgeUncertainty);
        }
        if overall < LOW_SCORE_THRESHOLD {
            return ReviewDecision::escalate(ReviewReason::LowOverallQuality);
        }
        ReviewDecision::skip()
    }

    pub fn priority(&self, tier1_passed: bool) -> u8 {
        if tier1_passed {
            DEFAULT_PRIORITY
        } else {
            TIER1_FAILED_PRIORITY
        }
    }
}

/// Snapshot of the coordinator's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub total_in_queue: usize,
    pub priority_breakdown: BTreeMap<u8, usize>,
    pub completed_reviews: usize,
}

#[derive(Debug, Default)]
struct ReviewState {
    queue: VecDeque<ReviewRequest>,
    completed: HashMap<String, Tier3Outcome>,
}

/// Priority queue of pending reviews plus the completed verdict store.
#[derive(Debug, Default)]
pub struct ReviewCoordinator {
    state: Mutex<ReviewState>,
}

impl ReviewCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a review request.
    ///
    /// Priority is clamped to 1-5. The request goes before the first entry
    /// with strictly lower priority, so equal priorities stay FIFO.
    pub fn enqueue(
        &self,
        evaluation_id: impl Into<String>,
        reason: impl Into<String>,
        priority: u8,
    ) -> ReviewRequest {
        let request = ReviewRequest {
            evaluation_id: evaluation_id.into(),
            priority: priority.clamp(1, 5),
            reason: reason.into(),
            flagged_at: Utc::now(),
        };

        let mut state = self.state.lock();
        let position = state
            .queue
            .iter()
            .position(|existing| request.priority > existing.priority)
            .unwrap_or(state.queue.len());
        state.queue.insert(position, request.clone());

        tracing::info!(
            evaluation_id = %request.evaluation_id,
            priority = request.priority,
            reason = %request.reason,
            position,
            "Queued for human review"
        );
        request
    }

    /// Remove and return the head of the queue.
    pub fn dequeue(&self) -> Option<ReviewRequest> {
        self.state.lock().queue.pop_front()
    }

    /// Pending requests in dequeue order.
    pub fn pending(&self) -> Vec<ReviewRequest> {
        self.state.lock().queue.iter().cloned().collect()
    }

    /// Record a verdict.
    ///
    /// An unrecognized verdict is rejected without touching any state. On
    /// success the verdict replaces any earlier one for the same evaluation
    /// and the evaluation's pending entry, if any, is removed.
    pub fn submit_review(
        &self,
        evaluation_id: &str,
        reviewer_id: impl Into<String>,
        verdict: &str,
        notes: impl Into<String>,
        corrected_output: Option<String>,
    ) -> Result<Tier3Outcome, ReviewError> {
        let outcome = Self::prepare_review(reviewer_id, verdict, notes, corrected_output)?;
        self.record_review(evaluation_id, outcome.clone());
        Ok(outcome)
    }

    /// Validate a verdict and build its outcome without touching the queue
    /// or the completed store. Pair with [`ReviewCoordinator::record_review`]
    /// when the verdict must first be applied elsewhere.
    pub fn prepare_review(
        reviewer_id: impl Into<String>,
        verdict: &str,
        notes: impl Into<String>,
        corrected_output: Option<String>,
    ) -> Result<Tier3Outcome, ReviewError> {
        let verdict: Verdict = verdict.parse()?;
        Ok(Tier3Outcome {
            reviewer_id: reviewer_id.into(),
            verdict,
            notes: notes.into(),
            corrected_output,
            reviewed_at: Utc::now(),
        })
    }

    /// Store a verdict and drop the evaluation's pending entry.
    pub fn record_review(&self, evaluation_id: &str, outcome: Tier3Outcome) {
        let mut state = self.state.lock();
        state.queue.retain(|r| r.evaluation_id != evaluation_id);

        tracing::info!(
            evaluation_id,
            reviewer_id = %outcome.reviewer_id,
            verdict = %outcome.verdict,
            "Review submitted"
        );
        state.completed.insert(evaluation_id.to_string(), outcome);
    }

    pub fn review_result(&self, evaluation_id: &str) -> Option<Tier3Outcome> {
        self.state.lock().completed.get(evaluation_id).cloned()
    }

    pub fn queue_status(&self) -> QueueStatus {
        let state = self.state.lock();
        let mut priority_breakdown = BTreeMap::new();
        for request in &state.queue {
            *priority_breakdown.entry(request.priority).or_insert(0) += 1;
        }
        QueueStatus {
            total_in_queue: state.queue.len(),
            priority_breakdown,
            completed_reviews: state.completed.len(),
        }
    }
}
