//! Router configuration

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Progress callback invoked with `(service_name, percent)` while a worker
/// downloads or loads model weights
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// Router configuration, immutable after construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Location of the embedding service
    pub embedding_service_path: String,

    /// Location of the generation service
    pub generation_service_path: String,

    /// Location of the extractive QA service
    pub eqa_service_path: String,

    /// Retrieval breadth: maximum chunks handed to a strategy
    #[serde(default = "default_max_context_chunks")]
    pub max_context_chunks: usize,

    /// Base cosine-similarity cutoff; the adaptive threshold adjusts
    /// per-query from this value
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Minimum EQA confidence for accepting an extractive answer
    #[serde(default = "default_eqa_confidence_threshold")]
    pub eqa_confidence_threshold: f32,

    /// Per-request timeout for ordinary calls (embed, generate, extract)
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,

    /// How long to wait for a worker's ready signal during startup
    #[serde(default = "default_ready_timeout", with = "duration_secs")]
    pub ready_timeout: Duration,

    /// Extended startup wait for services that download/initialize model
    /// weights before signalling ready
    #[serde(default = "default_model_load_timeout", with = "duration_secs")]
    pub model_load_timeout: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            embedding_service_path: std::env::var("VITAEQ_EMBEDDING_SERVICE")
                .unwrap_or_else(|_| "http://localhost:8601".to_string()),
            generation_service_path: std::env::var("VITAEQ_GENERATION_SERVICE")
                .unwrap_or_else(|_| "http://localhost:8602".to_string()),
            eqa_service_path: std::env::var("VITAEQ_EQA_SERVICE")
                .unwrap_or_else(|_| "http://localhost:8603".to_string()),
            max_context_chunks: default_max_context_chunks(),
            similarity_threshold: default_similarity_threshold(),
            eqa_confidence_threshold: default_eqa_confidence_threshold(),
            request_timeout: default_request_timeout(),
            ready_timeout: default_ready_timeout(),
            model_load_timeout: default_model_load_timeout(),
        }
    }
}

fn default_max_context_chunks() -> usize {
    3
}

fn default_similarity_threshold() -> f32 {
    // Source history wavered between 0.3 and 0.7; 0.3 is the canonical
    // choice here, with the adaptive threshold raising it for jargon-heavy
    // queries. See DESIGN.md.
    0.3
}

fn default_eqa_confidence_threshold() -> f32 {
    0.3
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_ready_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_model_load_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Serialize Durations as whole seconds in config files
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.max_context_chunks, 3);
        assert!((config.similarity_threshold - 0.3).abs() < f32::EPSILON);
        assert!(config.model_load_timeout > config.ready_timeout);
        assert!(config.ready_timeout > config.request_timeout);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: RouterConfig = serde_json::from_str(
            r#"{
                "embedding_service_path": "http://emb:9000",
                "generation_service_path": "http://gen:9001",
                "eqa_service_path": "http://eqa:9002",
                "request_timeout": 5
            }"#,
        )
        .unwrap();
        assert_eq!(config.embedding_service_path, "http://emb:9000");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.max_context_chunks, 3);
    }
}
