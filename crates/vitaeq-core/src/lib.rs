//! Vitaeq Core Library
//!
//! Query-routing and worker-orchestration engine for answering natural
//! language questions against a fixed resume knowledge base.
//!
//! # Features
//! - Request/response correlation to three inference workers (embedding,
//!   generation, extractive QA) with per-request timeouts
//! - Cosine-similarity retrieval with per-query adaptive thresholds
//! - Intent-based routing between extractive and generative answering,
//!   with confidence-gated fallback chains
//! - Bounded embedding cache and TTL-expiring query-result cache

pub mod cache;
pub mod config;
pub mod error;
pub mod intent;
pub mod knowledge;
pub mod preprocess;
pub mod retrieval;
pub mod router;
pub mod strategy;
pub mod validate;
pub mod worker;

pub use cache::{CacheEvent, EmbeddingCache, QueryResultCache};
pub use config::{ProgressCallback, RouterConfig};
pub use error::{Error, Result, VitaeqError};
pub use knowledge::{AnswerMethod, Chunk, ChunkMetadata, QueryIntent, QueryMetrics, QueryResult};
pub use preprocess::ConversationTurn;
pub use retrieval::{cosine_similarity, ScoredChunk};
pub use router::{BackendFactory, Router, RouterStatus};
pub use strategy::{QueryOptions, ResponseStyle, NO_CONTEXT_ANSWER};
pub use worker::{BackendSet, HttpBackend, InferenceBackend, RequestChannel};
