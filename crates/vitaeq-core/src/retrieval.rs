//! Cosine-similarity retrieval over chunk embeddings

use crate::knowledge::Chunk;

/// A chunk scored against a query embedding
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk_id: String,
    pub text: String,
    pub similarity: f32,
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 for mismatched dimensions or a zero-norm operand; a
/// mismatched dimension upstream means the embedding must be regenerated,
/// never compared.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Score every embedded chunk against the query, descending, truncated to k
///
/// Chunks without a usable embedding are skipped; the router embeds them
/// on demand before calling in here, so a skip only happens if on-demand
/// embedding itself failed.
pub fn find_similar(query_embedding: &[f32], chunks: &[Chunk], k: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunks
        .iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_ref()?;
            if embedding.len() != query_embedding.len() {
                return None;
            }
            Some(ScoredChunk {
                chunk_id: chunk.id.clone(),
                text: chunk.text.clone(),
                similarity: cosine_similarity(query_embedding, embedding),
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Drop entries below `threshold` and cap the rest at `max`, preserving
/// the descending sort order
pub fn apply_threshold(results: &[ScoredChunk], threshold: f32, max: usize) -> Vec<ScoredChunk> {
    results
        .iter()
        .filter(|r| r.similarity >= threshold)
        .take(max)
        .cloned()
        .collect()
}
