//! Knowledge base data model
//!
//! A knowledge base is a small fixed set of resume chunks. Embeddings are
//! filled in lazily: in batch during `Router::initialize`, or on demand the
//! first time a chunk is compared against a query.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A segment of the knowledge base with an associated embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier (e.g. "experience_react")
    pub id: String,
    /// Raw chunk text
    pub text: String,
    /// Embedding vector, filled lazily; all embeddings of one router
    /// instance share a single dimensionality
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// Chunk provenance metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Chunk {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    /// Whether the stored embedding can be compared against a query
    /// embedding of `dimensions`. A mismatched dimension means the stored
    /// vector came from a different model and must be regenerated, never
    /// compared.
    pub fn has_embedding_of(&self, dimensions: usize) -> bool {
        self.embedding
            .as_ref()
            .map(|e| e.len() == dimensions)
            .unwrap_or(false)
    }
}

/// Classified purpose of a query, selects the answering strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    FactRetrieval,
    Conversational,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryIntent::FactRetrieval => write!(f, "fact_retrieval"),
            QueryIntent::Conversational => write!(f, "conversational"),
        }
    }
}

/// How the final answer was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMethod {
    /// Extractive span from the EQA service
    Eqa,
    /// Free-text synthesis from the generation service
    Generation,
    /// Canned degraded answer (no usable chunks or quality gate)
    Fallback,
    /// Transport or pipeline failure surfaced as a structured result
    Error,
}

impl std::fmt::Display for AnswerMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnswerMethod::Eqa => write!(f, "eqa"),
            AnswerMethod::Generation => write!(f, "generation"),
            AnswerMethod::Fallback => write!(f, "fallback"),
            AnswerMethod::Error => write!(f, "error"),
        }
    }
}

/// Per-query observability counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryMetrics {
    /// Chunks scored against the query embedding
    pub chunks_considered: usize,
    /// Chunks that survived threshold filtering and reached a strategy
    pub chunks_used: usize,
    /// Result was served from the query-result cache
    pub cache_hit: bool,
    /// Strategy fallbacks taken while producing the answer
    pub fallbacks: usize,
    /// Composite quality estimate from validation (generation answers only)
    pub quality_score: Option<f32>,
}

/// Structured outcome of one `process_query` call
///
/// Immutable after production; the query-result cache stores and returns
/// clones, never the caller's instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub answer: String,
    /// Trustworthiness estimate in [0, 1]
    pub confidence: f32,
    pub intent: QueryIntent,
    pub method: AnswerMethod,
    /// Ids of the chunks that informed the answer
    pub matched_chunks: Vec<String>,
    pub processing_time: Duration,
    pub metrics: QueryMetrics,
}

impl QueryResult {
    /// Degraded result for pipeline failures; `process_query` never throws
    pub fn error(intent: QueryIntent) -> Self {
        Self {
            answer: "Sorry, something went wrong while answering that. Please try again."
                .to_string(),
            confidence: 0.0,
            intent,
            method: AnswerMethod::Error,
            matched_chunks: Vec::new(),
            processing_time: Duration::ZERO,
            metrics: QueryMetrics::default(),
        }
    }
}
