//! Answering strategies
//!
//! Two paths per query: extractive fact retrieval against the EQA service,
//! and free-text synthesis against the generation service. Fact retrieval
//! delegates to synthesis whenever its answer fails the acceptance gate;
//! synthesis never fails outward, degrading to canned fallbacks instead.

mod conversational;
mod fact;

pub use conversational::answer_conversational;
pub use fact::answer_fact;

use crate::knowledge::AnswerMethod;
use crate::preprocess::ConversationTurn;
use serde::{Deserialize, Serialize};

/// Canned answer when no chunk survives threshold filtering
pub const NO_CONTEXT_ANSWER: &str = "I don't have enough information to answer that question.";

/// Canned answer for generation transport failures
pub const TRANSPORT_ERROR_ANSWER: &str =
    "Sorry, I'm having trouble answering right now. Please try again in a moment.";

/// Tone of the synthesized answer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStyle {
    #[default]
    Developer,
    Hr,
    Friend,
}

impl ResponseStyle {
    /// Style tag embedded in the generation prompt
    pub fn tag(&self) -> &'static str {
        match self {
            ResponseStyle::Developer => "developer",
            ResponseStyle::Hr => "hr",
            ResponseStyle::Friend => "friend",
        }
    }
}

impl std::str::FromStr for ResponseStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "developer" | "dev" => Ok(ResponseStyle::Developer),
            "hr" | "recruiter" => Ok(ResponseStyle::Hr),
            "friend" | "casual" => Ok(ResponseStyle::Friend),
            other => Err(format!("unknown response style '{}'", other)),
        }
    }
}

/// Caller-supplied options for one query
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub style: ResponseStyle,
    /// Most recent conversation turns, newest last
    pub recent_turns: Vec<ConversationTurn>,
}

/// What a strategy produced; the router folds this into a `QueryResult`
#[derive(Debug, Clone)]
pub struct StrategyOutcome {
    pub answer: String,
    pub confidence: f32,
    pub method: AnswerMethod,
    pub matched_chunks: Vec<String>,
    /// Fallbacks taken along the way (EQA gate, validation, transport)
    pub fallbacks: usize,
    /// Quality estimate from validation; generation answers only
    pub quality_score: Option<f32>,
}
