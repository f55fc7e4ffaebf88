//! Tier 1: instant rule-based checks.
//!
//! The orchestrator only depends on the [`RuleChecker`] trait. The bundled
//! [`PatternRuleChecker`] covers PII, profanity, token limits and
//! reference similarity.

pub mod patterns;
pub mod similarity;

use serde_json::json;

use crate::types::Tier1Outcome;

/// A stateless function of (output, optional reference) to tier 1 facts.
pub trait RuleChecker: Send + Sync {
    fn check(&self, output: &str, reference: Option<&str>) -> Tier1Outcome;
}

/// Regex and word-list based rule checker.
#[derive(Debug, Clone)]
pub struct PatternRuleChecker {
    token_limit: usize,
}

impl PatternRuleChecker {
    pub fn new(token_limit: usize) -> Self {
        Self { token_limit }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    /// Whitespace-delimited word count.
    fn count_tokens(output: &str) -> usize {
        output.split_whitespace().count()
    }
}

impl Default for PatternRuleChecker {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl RuleChecker for PatternRuleChecker {
    fn check(&self, output: &str, reference: Option<&str>) -> Tier1Outcome {
        let pii_types = patterns::pii_types(output);
        let profanity = patterns::profanity_words(output);
        let token_count = Self::count_tokens(output);

        let mut outcome = Tier1Outcome::new(
            !pii_types.is_empty(),
            !profanity.is_empty(),
            token_count,
            token_count > self.token_limit,
        );

        if let Some(reference) = reference.filter(|r| !r.trim().is_empty()) {
            outcome.similarity_score = Some(similarity::rouge_l(output, reference));
            outcome.bleu_score = Some(similarity::bleu(output, reference));
        }

        outcome.details.insert("pii_types_found".to_string(), json!(pii_types));
        outcome
            .details
            .insert("profanity_words_found".to_string(), json!(profanity));
        outcome
            .details
            .insert("token_limit".to_string(), json!(self.token_limit));

        outcome
    }
}
