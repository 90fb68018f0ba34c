//! Query preprocessing
//!
//! Pure text transforms applied before retrieval: normalization, synonym
//! expansion, context-keyword injection from recent turns, and the
//! per-query adaptive similarity threshold.

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One past exchange, used to carry retrieval context across turns
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    /// Ids of chunks that informed the answer
    #[serde(default)]
    pub matched_chunks: Vec<String>,
}

/// How many recent turns contribute context keywords
const CONTEXT_TURNS: usize = 2;

/// Maximum context keywords appended to a query
const MAX_CONTEXT_KEYWORDS: usize = 3;

/// Minimum keyword length worth carrying over
const MIN_KEYWORD_LEN: usize = 3;

lazy_static! {
    /// Fixed synonym table; expansion appends, never replaces
    static ref SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("react", "reactjs");
        m.insert("javascript", "js");
        m.insert("typescript", "ts");
        m.insert("database", "db");
        m.insert("postgres", "postgresql");
        m.insert("kubernetes", "k8s");
        m.insert("machine", "ml");
        m.insert("job", "position");
        m.insert("work", "experience");
        m.insert("school", "education");
        m
    };

    static ref QUESTION_WORDS: Vec<&'static str> = vec![
        "what", "when", "where", "which", "who", "why", "how", "is", "are",
        "do", "does", "did", "can", "could",
    ];

    /// Jargon terms that justify a stricter similarity cutoff
    static ref TECHNICAL_TERMS: Vec<&'static str> = vec![
        "framework", "architecture", "infrastructure", "microservice",
        "pipeline", "deployment", "algorithm",
    ];
}

/// Lowercase and strip punctuation, collapsing whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the enhanced query used for embedding and caching
///
/// Normalizes the question, appends synonym expansions for any word in the
/// fixed table, then injects up to three keywords drawn from the chunk ids
/// matched in the last two conversation turns.
pub fn preprocess(question: &str, recent_turns: &[ConversationTurn]) -> String {
    let normalized = normalize(question);
    let mut parts: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();

    let expansions: Vec<String> = parts
        .iter()
        .filter_map(|word| SYNONYMS.get(word.as_str()))
        .map(|s| s.to_string())
        .filter(|s| !parts.contains(s))
        .collect();
    parts.extend(expansions);

    let mut context_keywords = Vec::new();
    for turn in recent_turns.iter().rev().take(CONTEXT_TURNS) {
        for chunk_id in &turn.matched_chunks {
            for keyword in chunk_id.split(|c: char| !c.is_alphanumeric()) {
                let keyword = keyword.to_lowercase();
                if keyword.len() >= MIN_KEYWORD_LEN
                    && !parts.contains(&keyword)
                    && !context_keywords.contains(&keyword)
                {
                    context_keywords.push(keyword);
                }
            }
        }
    }
    context_keywords.truncate(MAX_CONTEXT_KEYWORDS);
    parts.extend(context_keywords);

    parts.join(" ")
}

/// Compute the per-query similarity cutoff from a base threshold
///
/// Exactly one adjustment applies, the first matching rule in a fixed
/// precedence order: short query, then interrogative, then technical
/// jargon. Short queries and questions lower the cutoff to favor recall;
/// jargon-heavy queries raise it to favor precision.
pub fn adaptive_threshold(query: &str, base: f32) -> f32 {
    let trimmed = query.trim();
    let lowered = trimmed.to_lowercase();

    let adjusted = if trimmed.len() < 20 {
        base - 0.10
    } else if trimmed.contains('?')
        || QUESTION_WORDS
            .iter()
            .any(|w| lowered.starts_with(&format!("{} ", w)))
    {
        base - 0.05
    } else if TECHNICAL_TERMS.iter().any(|t| lowered.contains(t)) {
        base + 0.10
    } else {
        base
    };

    adjusted.clamp(0.05, 0.95)
}
