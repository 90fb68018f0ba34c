//! Generated-answer validation
//!
//! Two independent gates for generation-method answers. The scoring pass
//! flags short or off-topic answers, docks confidence, and swaps in a
//! clarification request when confidence falls too low. The raw-text
//! filter rejects known hallucination patterns outright. Extractive (EQA)
//! answers bypass both: extractive spans are naturally short, and flagging
//! them as "too short" would be wrong.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Confidence docked for a too-short answer
const SHORT_RESPONSE_PENALTY: f32 = 0.15;

/// Confidence docked for low question/answer keyword overlap
const LOW_RELEVANCE_PENALTY: f32 = 0.2;

/// Below this post-penalty confidence the answer is replaced outright
const FALLBACK_CONFIDENCE_FLOOR: f32 = 0.3;

/// Pinned confidence of the clarification-request replacement
const FALLBACK_CONFIDENCE: f32 = 0.2;

/// Canned replacement when validation gives up on a generated answer
pub const CLARIFICATION_REQUEST: &str =
    "I'm not sure I understood that correctly. Could you rephrase your question?";

lazy_static! {
    /// Known nonsensical or hallucinated output shapes: misspelled-name
    /// variants, technologies absent from the knowledge base that models
    /// like to inject, and templated filler
    static ref DENYLIST: Vec<Regex> = vec![
        Regex::new(r"(?i)\b(jhon|jonh|johhn)\b").unwrap(),
        Regex::new(r"(?i)as an ai( language)? model").unwrap(),
        Regex::new(r"(?i)\b(blockchain|cryptocurrency|quantum computing)\b").unwrap(),
        Regex::new(r"(?i)(i hope this helps|feel free to ask|lorem ipsum)").unwrap(),
    ];

    /// Acceptable first words of a generated answer
    static ref LEAD_TOKENS: Vec<&'static str> = vec![
        "i", "yes", "no", "my", "the", "he", "she", "they", "we", "it",
        "sure", "absolutely",
    ];
}

/// Issue observed while validating an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFlag {
    ShortResponse,
    LowRelevance,
    FallbackTriggered,
}

/// Outcome of the scoring pass
#[derive(Debug, Clone)]
pub struct Validation {
    pub answer: String,
    pub confidence: f32,
    pub flags: Vec<ValidationFlag>,
    /// Composite quality estimate in [0, 1]
    pub quality_score: f32,
    /// Matched sections must be cleared from the result (fallback path)
    pub clear_matched: bool,
}

/// Fraction of question keywords (length > 2) that overlap some answer
/// word, by containment in either direction
pub fn relevance(question: &str, answer: &str) -> f32 {
    let answer_lowered = answer.to_lowercase();
    let answer_words: Vec<&str> = answer_lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let question_lowered = question.to_lowercase();
    let keywords: Vec<&str> = question_lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .collect();
    if keywords.is_empty() {
        return 1.0;
    }

    let matched = keywords
        .iter()
        .filter(|k| {
            answer_words
                .iter()
                .any(|w| w.contains(*k) || k.contains(w))
        })
        .count();
    matched as f32 / keywords.len() as f32
}

/// Score a generation-method answer and repair it if quality is too low
pub fn validate(
    question: &str,
    answer: &str,
    confidence: f32,
    matched_count: usize,
) -> Validation {
    let mut flags = Vec::new();
    let mut confidence = confidence;

    if answer.len() < 20 {
        flags.push(ValidationFlag::ShortResponse);
        confidence -= SHORT_RESPONSE_PENALTY;
    }

    if relevance(question, answer) < 0.5 {
        flags.push(ValidationFlag::LowRelevance);
        confidence -= LOW_RELEVANCE_PENALTY;
    }

    let (answer, confidence, matched_count, clear_matched) =
        if confidence < FALLBACK_CONFIDENCE_FLOOR {
            flags.push(ValidationFlag::FallbackTriggered);
            (CLARIFICATION_REQUEST.to_string(), FALLBACK_CONFIDENCE, 0, true)
        } else {
            (answer.to_string(), confidence, matched_count, false)
        };

    let quality_score = (0.6 * confidence
        + (answer.len() as f32 / 500.0).min(0.2)
        + (0.03 * matched_count as f32).min(0.1)
        - 0.05 * flags.len() as f32)
        .clamp(0.0, 1.0);

    Validation {
        answer,
        confidence,
        flags,
        quality_score,
        clear_matched,
    }
}

/// Raw-text hallucination filter, independent of the scoring pass
///
/// Returns the trimmed text when it is displayable; `None` tells the
/// caller to fall back rather than show the text.
pub fn accept_generated(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if DENYLIST.iter().any(|pattern| pattern.is_match(trimmed)) {
        tracing::debug!("rejecting generated text matching denylist");
        return None;
    }

    let lead = trimmed
        .split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())?
        .to_lowercase();
    if !LEAD_TOKENS.contains(&lead.as_str()) {
        tracing::debug!("rejecting generated text with unexpected lead token '{}'", lead);
        return None;
    }

    Some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_long_answer_keeps_confidence() {
        let v = validate(
            "How many years of React experience do you have?",
            "I have five years of professional React experience building web applications.",
            0.8,
            2,
        );
        assert!(v.flags.is_empty());
        assert!((v.confidence - 0.8).abs() < 1e-6);
        assert!(!v.clear_matched);
        assert!(v.quality_score > 0.5);
    }

    #[test]
    fn test_short_answer_flagged() {
        let v = validate("What databases do you know?", "Postgres mostly.", 0.9, 1);
        assert!(v.flags.contains(&ValidationFlag::ShortResponse));
        assert!(v.flags.contains(&ValidationFlag::LowRelevance));
        assert!((v.confidence - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_irrelevant_answer_docked() {
        let v = validate(
            "What frontend frameworks have you used professionally?",
            "The weather yesterday was surprisingly pleasant around here.",
            0.6,
            1,
        );
        assert!(v.flags.contains(&ValidationFlag::LowRelevance));
        assert!(v.confidence < 0.6);
    }

    #[test]
    fn test_low_confidence_triggers_fallback() {
        let v = validate(
            "What frontend frameworks have you used professionally?",
            "Maybe things.",
            0.4,
            3,
        );
        // Short + irrelevant: 0.4 - 0.15 - 0.2 < 0.3
        assert!(v.flags.contains(&ValidationFlag::FallbackTriggered));
        assert_eq!(v.answer, CLARIFICATION_REQUEST);
        assert!((v.confidence - FALLBACK_CONFIDENCE).abs() < 1e-6);
        assert!(v.clear_matched);
    }

    #[test]
    fn test_quality_score_bounds() {
        let v = validate("query words here", "x", 0.0, 0);
        assert!(v.quality_score >= 0.0 && v.quality_score <= 1.0);
        let v = validate(
            "react",
            &"react is great and I use it daily. ".repeat(30),
            1.0,
            10,
        );
        assert!(v.quality_score <= 1.0);
    }

    #[test]
    fn test_accept_plain_answer() {
        assert_eq!(
            accept_generated("  I have five years of React experience.  "),
            Some("I have five years of React experience.")
        );
        assert!(accept_generated("Yes, PostgreSQL and Redis.").is_some());
    }

    #[test]
    fn test_reject_denylisted_patterns() {
        assert!(accept_generated("I built a blockchain startup.").is_none());
        assert!(accept_generated("As an AI language model, I cannot say.").is_none());
        assert!(accept_generated("I hope this helps!").is_none());
        assert!(accept_generated("Jhon has many skills.").is_none());
    }

    #[test]
    fn test_reject_unexpected_lead_token() {
        assert!(accept_generated("Banana is the answer.").is_none());
        assert!(accept_generated("").is_none());
        assert!(accept_generated("   ").is_none());
    }
}
