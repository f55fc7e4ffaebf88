//! Detection patterns for tier 1 checks.
//!
//! PII regexes and the profanity word list live here so the checker logic
//! stays separate from what it looks for.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Email address pattern (RFC 5322 simplified)
    pub static ref EMAIL_PATTERN: Regex = Regex::new(
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b"
    ).unwrap();

    /// Social Security Number pattern (XXX-XX-XXXX)
    pub static ref SSN_PATTERN: Regex = Regex::new(
        r"\b\d{3}-\d{2}-\d{4}\b"
    ).unwrap();

    /// US phone number pattern
    pub static ref PHONE_PATTERN: Regex = Regex::new(
        r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b"
    ).unwrap();

    /// Credit card number pattern (16 digits with optional separators)
    pub static ref CREDIT_CARD_PATTERN: Regex = Regex::new(
        r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b"
    ).unwrap();

    static ref WORD_PATTERN: Regex = Regex::new(r"\b\w+\b").unwrap();

    /// Labelled PII patterns, checked in this order.
    static ref PII_PATTERNS: Vec<(&'static str, &'static Regex)> = vec![
        ("email", &*EMAIL_PATTERN),
        ("ssn", &*SSN_PATTERN),
        ("phone", &*PHONE_PATTERN),
        ("credit_card", &*CREDIT_CARD_PATTERN),
    ];
}

const PROFANITY_LIST: &[&str] = &[
    "damn", "hell", "crap", "fuck", "shit", "ass", "bitch", "bastard", "dick", "piss", "pussy",
    "cock", "asshole",
];

/// Labels of every PII type present in `content`.
pub fn pii_types(content: &str) -> Vec<&'static str> {
    PII_PATTERNS
        .iter()
        .filter(|(_, regex)| regex.is_match(content))
        .map(|(label, _)| *label)
        .collect()
}

/// Check if content contains any PII.
pub fn contains_pii(content: &str) -> bool {
    PII_PATTERNS.iter().any(|(_, regex)| regex.is_match(content))
}

/// Profane words in `content`, lowercased, in order of appearance.
pub fn profanity_words(content: &str) -> Vec<String> {
    let lower = content.to_lowercase();
    WORD_PATTERN
        .find_iter(&lower)
        .map(|m| m.as_str())
        .filter(|word| PROFANITY_LIST.contains(word))
        .map(str::to_string)
        .collect()
}

/// Check if content contains profanity (whole words only).
pub fn contains_profanity(content: &str) -> bool {
    !profanity_words(content).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_detection() {
        assert!(contains_pii("Contact john@example.com for help"));
        assert_eq!(pii_types("Email: user.name+tag@domain.co.uk"), vec!["email"]);
        assert!(!contains_pii("No email here"));
    }

    #[test]
    fn test_ssn_and_phone_detection() {
        assert!(pii_types("SSN: 123-45-6789").contains(&"ssn"));
        assert!(pii_types("Call us at 555-123-4567").contains(&"phone"));
    }

    #[test]
    fn test_credit_card_detection() {
        assert!(pii_types("Card: 4111-1111-1111-1111").contains(&"credit_card"));
        assert!(pii_types("CC: 4111 1111 1111 1111").contains(&"credit_card"));
    }

    #[test]
    fn test_profanity_whole_words() {
        assert_eq!(profanity_words("Well, DAMN that was close"), vec!["damn"]);
        // Substrings of clean words do not count
        assert!(!contains_profanity("The class assessment went well"));
        assert!(!contains_profanity("Hello there"));
    }
}
