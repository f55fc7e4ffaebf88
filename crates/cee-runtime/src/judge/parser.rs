//! Judge response parsing.
//!
//! Judges do not always answer with bare JSON. Extraction tries, in order:
//! 1. the whole response as JSON
//! 2. the body of a fenced ```json block
//! 3. the span from the first `{` to the last `}`
//!
//! The extracted value must then validate against the embedded judge
//! response schema before it becomes a [`Tier2Outcome`].

use std::sync::OnceLock;

use cee_core::{DimensionScore, JudgeDimension, Tier2Outcome};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value as JsonValue;

use super::JudgeError;

/// Embedded judge response schema.
const JUDGE_SCHEMA_JSON: &str = include_str!("../../schema/judge_response.schema.json");

static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

lazy_static! {
    static ref FENCED_JSON: Regex = Regex::new(r"(?s)```(?:json)?\s*\n(.*?)```").unwrap();
}

fn get_validator() -> Result<&'static jsonschema::Validator, JudgeError> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: JsonValue = serde_json::from_str(JUDGE_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;
        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result
        .as_ref()
        .map_err(|e| JudgeError::Schema(vec![e.clone()]))
}

/// Pull a JSON value out of a free-form judge response.
pub fn extract_json(text: &str) -> Result<JsonValue, JudgeError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Ok(value);
    }

    if let Some(body) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        if let Ok(value) = serde_json::from_str::<JsonValue>(body.as_str().trim()) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(JudgeError::Parse(format!(
        "no JSON object found in judge response ({} chars)",
        text.len()
    )))
}

/// Validate against the judge response schema, collecting every violation.
pub fn validate_response(value: &JsonValue) -> Result<(), JudgeError> {
    let validator = get_validator()?;
    let errors: Vec<String> = validator
        .iter_errors(value)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(JudgeError::Schema(errors))
    }
}

/// Parse a raw judge response into a validated outcome.
pub fn parse_judge_response(text: &str, judge_model: &str) -> Result<Tier2Outcome, JudgeError> {
    let value = extract_json(text)?;
    validate_response(&value)?;

    let dimension = |d: JudgeDimension| -> DimensionScore {
        let entry = &value[d.key()];
        // Schema guarantees an integer in 1..=5
        let score = entry["score"].as_f64().unwrap_or(0.0) as u8;
        let reasoning = entry["reasoning"].as_str().unwrap_or_default();
        DimensionScore::new(score, reasoning)
    };

    let uncertainty_flag = value
        .get("uncertainty_flag")
        .and_then(JsonValue::as_bool)
        .unwrap_or(false);

    Tier2Outcome::new(
        dimension(JudgeDimension::FactualAccuracy),
        dimension(JudgeDimension::SafetyPolicy),
        dimension(JudgeDimension::AlignmentHelpfulness),
        dimension(JudgeDimension::ToneStyle),
        dimension(JudgeDimension::Conciseness),
        uncertainty_flag,
        judge_model,
    )
    .map_err(|e| JudgeError::Schema(vec![e.to_string()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(scores: [u8; 5], uncertain: bool) -> String {
        serde_json::json!({
            "factual_accuracy": {"score": scores[0], "reasoning": "accurate"},
            "safety_policy": {"score": scores[1], "reasoning": "safe"},
            "alignment_helpfulness": {"score": scores[2], "reasoning": "helpful"},
            "tone_style": {"score": scores[3], "reasoning": "fine"},
            "conciseness": {"score": scores[4], "reasoning": "short"},
            "uncertainty_flag": uncertain
        })
        .to_string()
    }

    #[test]
    fn test_strict_json() {
        let outcome = parse_judge_response(&response([5, 4, 4, 3, 4], false), "judge").unwrap();
        assert_eq!(outcome.overall_score, 4.0);
        assert_eq!(outcome.safety_policy.score, 4);
        assert_eq!(outcome.factual_accuracy.reasoning, "accurate");
        assert_eq!(outcome.judge_model, "judge");
        assert!(!outcome.uncertainty_flag);
    }

    #[test]
    fn test_fenced_json() {
        let text = format!(
            "Here is my evaluation:\n```json\n{}\n```\nLet me know if you need more.",
            response([3, 3, 3, 3, 3], true)
        );
        let outcome = parse_judge_response(&text, "judge").unwrap();
        assert_eq!(outcome.overall_score, 3.0);
        assert!(outcome.uncertainty_flag);
    }

    #[test]
    fn test_embedded_braces() {
        let text = format!("Sure! {} Hope this helps.", response([2, 2, 2, 2, 2], false));
        let outcome = parse_judge_response(&text, "judge").unwrap();
        assert_eq!(outcome.overall_score, 2.0);
    }

    #[test]
    fn test_no_json_is_parse_error() {
        let err = parse_judge_response("I cannot evaluate this.", "judge").unwrap_err();
        assert!(matches!(err, JudgeError::Parse(_)));
    }

    #[test]
    fn test_uncertainty_flag_defaults_false() {
        let mut value: JsonValue = serde_json::from_str(&response([4, 4, 4, 4, 4], true)).unwrap();
        value.as_object_mut().unwrap().remove("uncertainty_flag");
        let outcome = parse_judge_response(&value.to_string(), "judge").unwrap();
        assert!(!outcome.uncertainty_flag);
    }

    #[test]
    fn test_out_of_range_score_fails_schema() {
        let err = parse_judge_response(&response([6, 4, 4, 4, 4], false), "judge").unwrap_err();
        match err {
            JudgeError::Schema(errors) => assert!(!errors.is_empty()),
            other => panic!("Expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_dimension_fails_schema() {
        let mut value: JsonValue = serde_json::from_str(&response([4, 4, 4, 4, 4], false)).unwrap();
        value.as_object_mut().unwrap().remove("conciseness");
        assert!(matches!(
            parse_judge_response(&value.to_string(), "judge"),
            Err(JudgeError::Schema(_))
        ));
    }

    proptest::proptest! {
        #[test]
        fn prop_valid_scores_yield_mean(scores in proptest::array::uniform5(1u8..=5)) {
            let outcome = parse_judge_response(&response(scores, false), "judge").unwrap();
            let mean = scores.iter().map(|&s| f64::from(s)).sum::<f64>() / 5.0;
            proptest::prop_assert_eq!(outcome.overall_score, mean);
            proptest::prop_assert!((1.0..=5.0).contains(&outcome.overall_score));
        }

        #[test]
        fn prop_out_of_range_rejected(bad in 6u8..=u8::MAX, slot in 0usize..5) {
            let mut scores = [3u8; 5];
            scores[slot] = bad;
            let is_schema_error = matches!(
                parse_judge_response(&response(scores, false), "judge"),
                Err(JudgeError::Schema(_))
            );
            proptest::prop_assert!(is_schema_error);
        }
    }

    #[test]
    fn test_string_score_fails_schema() {
        let text = response([4, 4, 4, 4, 4], false).replacen("\"score\":4", "\"score\":\"4\"", 1);
        assert!(matches!(
            parse_judge_response(&text, "judge"),
            Err(JudgeError::Schema(_))
        ));
    }
}
