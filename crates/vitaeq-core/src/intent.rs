//! Lexical intent classification
//!
//! A deterministic rule set over surface text; no learned model. Queries
//! that look like a lookup of a specific fact route to extractive QA,
//! everything ambiguous defaults to conversational synthesis.

use crate::knowledge::QueryIntent;
use lazy_static::lazy_static;

lazy_static! {
    /// Leading phrases that signal a single extractable fact
    static ref FACT_PREFIXES: Vec<&'static str> = vec![
        "how many",
        "how much",
        "how long",
        "when ",
        "what year",
        "what date",
        "which company",
        "which university",
        "where ",
        "who ",
    ];

    /// Mid-query markers for quantity/duration lookups
    static ref FACT_MARKERS: Vec<&'static str> = vec![
        "years of",
        "number of",
        "degree in",
        "graduated",
    ];

    /// Openers that signal open-ended synthesis even when a fact marker
    /// also appears
    static ref CONVERSATIONAL_PREFIXES: Vec<&'static str> = vec![
        "tell me",
        "describe",
        "explain",
        "why ",
        "summarize",
        "walk me through",
    ];
}

/// Classify a query's intent from surface text alone
pub fn classify(query: &str) -> QueryIntent {
    let lowered = query.trim().to_lowercase();

    if CONVERSATIONAL_PREFIXES
        .iter()
        .any(|p| lowered.starts_with(p))
    {
        return QueryIntent::Conversational;
    }

    let is_fact = FACT_PREFIXES.iter().any(|p| lowered.starts_with(p))
        || FACT_MARKERS.iter().any(|m| lowered.contains(m));
    if is_fact {
        QueryIntent::FactRetrieval
    } else {
        QueryIntent::Conversational
    }
}
