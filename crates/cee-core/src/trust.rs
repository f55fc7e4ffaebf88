//! Trust score calculation.
//!
//! Combines the three tier outcomes into a single 0-100 score:
//!
//! ```text
//! overall = w1·S1 + w2·S2 + w3·S3
//! ```
//!
//! Without a human review the tier 1 and tier 2 weights are renormalized
//! proportionally so the two-tier score still spans the full range.
//!
//! This is a pure function of its inputs. Recomputing after a human verdict
//! means calling [`TrustScoreCalculator::calculate`] again with all three
//! outcomes.

use std::collections::BTreeMap;

use crate::config::{ConfigError, TrustWeights};
use crate::types::{JudgeDimension, Tier1Outcome, Tier2Outcome, Tier3Outcome, TrustScore, Verdict};

const PII_PENALTY: f64 = 40.0;
const PROFANITY_PENALTY: f64 = 25.0;
const TOKEN_LIMIT_PENALTY: f64 = 15.0;
const SIMILARITY_BONUS: f64 = 10.0;
const UNCERTAINTY_FACTOR: f64 = 0.9;

const BASE_MARGIN: f64 = 5.0;
const UNCERTAIN_MARGIN: f64 = 10.0;
const NO_REVIEW_MARGIN: f64 = 3.0;

/// Weighted aggregation of tier outcomes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrustScoreCalculator {
    weights: TrustWeights,
}

impl Default for TrustScoreCalculator {
    fn default() -> Self {
        Self {
            weights: TrustWeights::default(),
        }
    }
}

impl TrustScoreCalculator {
    /// Fails if the weights are negative or do not sum to 1.0.
    pub fn new(weights: TrustWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> TrustWeights {
        self.weights
    }

    /// Compute the aggregate score and its breakdown.
    pub fn calculate(
        &self,
        tier1: &Tier1Outcome,
        tier2: &Tier2Outcome,
        tier3: Option<&Tier3Outcome>,
    ) -> TrustScore {
        let s1 = tier1_score(tier1);
        let s2 = tier2_score(tier2);
        let s3 = tier3.map(|t| tier3_score(t.verdict));

        let w = self.weights;
        let overall = match s3 {
            Some(s3) => w.tier1 * s1 + w.tier2 * s2 + w.tier3 * s3,
            None => {
                let partial = w.tier1 + w.tier2;
                if partial > 0.0 {
                    (w.tier1 / partial) * s1 + (w.tier2 / partial) * s2
                } else {
                    0.0
                }
            }
        };

        let mut breakdown = BTreeMap::new();
        breakdown.insert("tier1_weight".to_string(), w.tier1);
        breakdown.insert("tier2_weight".to_string(), w.tier2);
        breakdown.insert("tier3_weight".to_string(), w.tier3);
        breakdown.insert("tier1_contribution".to_string(), round2(w.tier1 * s1));
        breakdown.insert("tier2_contribution".to_string(), round2(w.tier2 * s2));
        if let Some(s3) = s3 {
            breakdown.insert("tier3_contribution".to_string(), round2(w.tier3 * s3));
        }
        for dimension in JudgeDimension::ALL {
            let scaled = f64::from(tier2.dimension(dimension).score) * 20.0;
            breakdown.insert(dimension.key().to_string(), scaled);
        }

        TrustScore {
            overall: round2(overall.clamp(0.0, 100.0)),
            tier1_score: round2(s1),
            tier2_score: round2(s2),
            tier3_score: s3.map(round2),
            breakdown,
        }
    }

    /// Lower and upper bound around `score.overall`.
    ///
    /// Base margin is ±5, ±10 when the judge was uncertain, plus 3 more when
    /// there is no human review.
    pub fn confidence_interval(&self, score: &TrustScore, judge_uncertain: bool) -> (f64, f64) {
        let mut margin = if judge_uncertain {
            UNCERTAIN_MARGIN
        } else {
            BASE_MARGIN
        };
        if score.tier3_score.is_none() {
            margin += NO_REVIEW_MARGIN;
        }
        (
            (score.overall - margin).max(0.0),
            (score.overall + margin).min(100.0),
        )
    }
}

fn tier1_score(outcome: &Tier1Outcome) -> f64 {
    if outcome.passed {
        return 100.0;
    }

    let mut score = 100.0;
    if outcome.pii_detected {
        score -= PII_PENALTY;
    }
    if outcome.profanity_detected {
        score -= PROFANITY_PENALTY;
    }
    if outcome.token_limit_exceeded {
        score -= TOKEN_LIMIT_PENALTY;
    }
    if let Some(similarity) = outcome.similarity_score {
        score += similarity * SIMILARITY_BONUS;
    }
    score.clamp(0.0, 100.0)
}

fn tier2_score(outcome: &Tier2Outcome) -> f64 {
    let score = outcome.overall_score / 5.0 * 100.0;
    if outcome.uncertainty_flag {
        score * UNCERTAINTY_FACTOR
    } else {
        score
    }
}

// Verdict is a closed enum, so there is no fallback score.
fn tier3_score(verdict: Verdict) -> f64 {
    match verdict {
        Verdict::Approved => 100.0,
        Verdict::NeedsRevision => 60.0,
        Verdict::Rejected => 20.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
