//! Reference-similarity metrics: ROUGE-L and sentence BLEU.
//!
//! Both operate on lowercased word tokens and return values in [0, 1].

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"\w+").unwrap();
}

const BLEU_MAX_ORDER: usize = 4;
const BLEU_SMOOTHING_EPSILON: f64 = 0.1;

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn lcs_len(a: &[String], b: &[String]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// ROUGE-L F1 of `candidate` against `reference`.
pub fn rouge_l(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    let lcs = lcs_len(&cand, &refr);
    if lcs == 0 {
        return 0.0;
    }
    let precision = lcs as f64 / cand.len() as f64;
    let recall = lcs as f64 / refr.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Sentence BLEU (uniform weights up to 4-grams) with epsilon smoothing for
/// orders that have no matches.
pub fn bleu(candidate: &str, reference: &str) -> f64 {
    let cand = tokenize(candidate);
    let refr = tokenize(reference);
    if cand.is_empty() || refr.is_empty() {
        return 0.0;
    }

    let mut log_sum = 0.0;
    for n in 1..=BLEU_MAX_ORDER {
        let cand_counts = ngram_counts(&cand, n);
        let ref_counts = ngram_counts(&refr, n);
        let total: usize = cand_counts.values().sum();
        if total == 0 {
            // Candidate shorter than n; treat the order as fully smoothed
            log_sum += BLEU_SMOOTHING_EPSILON.ln();
            continue;
        }
        let clipped: usize = cand_counts
            .iter()
            .map(|(gram, count)| (*count).min(ref_counts.get(gram).copied().unwrap_or(0)))
            .sum();
        let precision = if clipped == 0 {
            BLEU_SMOOTHING_EPSILON / total as f64
        } else {
            clipped as f64 / total as f64
        };
        log_sum += precision.ln();
    }

    let brevity = if cand.len() > refr.len() {
        1.0
    } else {
        (1.0 - refr.len() as f64 / cand.len() as f64).exp()
    };

    (brevity * (log_sum / BLEU_MAX_ORDER as f64).exp()).clamp(0.0, 1.0)
}
