//! Query routing and worker orchestration
//!
//! The router owns the three worker channels (embedding, generation, EQA),
//! sequences their startup, pre-embeds the knowledge chunks, and runs the
//! per-query pipeline: preprocess, cache lookup, embed, retrieve, classify,
//! dispatch, validate, cache store. Startup failures are fatal; everything
//! after `initialize` degrades into structured results instead of errors.

use crate::cache::{EmbeddingCache, QueryResultCache};
use crate::config::{ProgressCallback, RouterConfig};
use crate::error::{Result, VitaeqError};
use crate::intent;
use crate::knowledge::{AnswerMethod, Chunk, QueryIntent, QueryMetrics, QueryResult};
use crate::preprocess;
use crate::retrieval::{apply_threshold, find_similar};
use crate::strategy::{answer_conversational, answer_fact, QueryOptions};
use crate::worker::channel::RequestChannel;
use crate::worker::protocol::{RequestPayload, ResponsePayload};
use crate::worker::service::BackendSet;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Creates a fresh backend set; registered at construction so a router can
/// be re-initialized after `cleanup`
pub type BackendFactory = Box<dyn Fn() -> Result<BackendSet> + Send + Sync>;

/// Snapshot of router state for the presentation layer
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub initialized: bool,
    pub workers_ready: bool,
    pub chunks_loaded: usize,
    pub pending_request_count: usize,
}

struct Channels {
    embedding: RequestChannel,
    generation: RequestChannel,
    eqa: RequestChannel,
}

/// Top-level orchestrator over the three inference services
///
/// Exclusive access (`&mut self`) serializes queries within one router;
/// the design assumes a single logical query at a time and is not meant
/// for multi-tenant reuse.
pub struct Router {
    config: RouterConfig,
    factory: BackendFactory,
    progress: Option<ProgressCallback>,
    channels: Option<Channels>,
    chunks: Vec<Chunk>,
    embedding_cache: EmbeddingCache,
    result_cache: QueryResultCache,
    embedding_dimensions: Option<usize>,
}

impl Router {
    pub fn new(config: RouterConfig, factory: BackendFactory) -> Self {
        Self {
            config,
            factory,
            progress: None,
            channels: None,
            chunks: Vec::new(),
            embedding_cache: EmbeddingCache::new(),
            result_cache: QueryResultCache::new(),
            embedding_dimensions: None,
        }
    }

    /// Register a progress callback invoked with `(service, percent)`
    /// while workers load model weights
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Bring up the three workers and pre-embed the knowledge chunks
    ///
    /// The embedding service starts and is awaited first, because chunk
    /// pre-computation depends on it; generation and EQA start while the
    /// chunks embed. Any worker failure during startup aborts with a fatal
    /// error; there is no retry.
    pub async fn initialize(&mut self, chunks: Vec<Chunk>) -> Result<()> {
        if self.channels.is_some() {
            return Err(VitaeqError::Config(
                "router already initialized; call cleanup first".to_string(),
            ));
        }

        let set = (self.factory)()?;
        let embedding_timeout = self.startup_timeout(set.embedding.loads_model());
        let generation_timeout = self.startup_timeout(set.generation.loads_model());
        let eqa_timeout = self.startup_timeout(set.eqa.loads_model());

        let embedding = RequestChannel::spawn(
            "embedding",
            set.embedding,
            self.config.request_timeout,
            self.progress.clone(),
        )?;
        embedding.wait_ready(embedding_timeout).await?;
        tracing::info!("embedding worker ready");

        let generation = RequestChannel::spawn(
            "generation",
            set.generation,
            self.config.request_timeout,
            self.progress.clone(),
        )?;
        let eqa = RequestChannel::spawn(
            "eqa",
            set.eqa,
            self.config.request_timeout,
            self.progress.clone(),
        )?;

        let mut chunks = chunks;
        let prepare = prepare_chunks(&embedding, &mut chunks, &mut self.embedding_cache);
        let await_workers = async {
            generation.wait_ready(generation_timeout).await?;
            eqa.wait_ready(eqa_timeout).await?;
            Ok::<(), VitaeqError>(())
        };
        let (dimensions, ()) = tokio::try_join!(prepare, await_workers)?;

        self.embedding_dimensions = dimensions;
        self.chunks = chunks;
        self.channels = Some(Channels {
            embedding,
            generation,
            eqa,
        });
        tracing::info!(
            "router initialized with {} chunks ({:?} dimensions)",
            self.chunks.len(),
            self.embedding_dimensions
        );
        Ok(())
    }

    fn startup_timeout(&self, loads_model: bool) -> Duration {
        if loads_model {
            self.config.model_load_timeout
        } else {
            self.config.ready_timeout
        }
    }

    /// Answer one question; never returns an error
    ///
    /// All failures surface as structured results with `method: Error` and
    /// zero confidence.
    pub async fn process_query(&mut self, question: &str, options: &QueryOptions) -> QueryResult {
        let start = Instant::now();
        let intent = intent::classify(question);

        match self.run_pipeline(question, intent, options, start).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("query pipeline failed: {}", e);
                let mut result = QueryResult::error(intent);
                result.processing_time = start.elapsed();
                result
            }
        }
    }

    async fn run_pipeline(
        &mut self,
        question: &str,
        intent: QueryIntent,
        options: &QueryOptions,
        start: Instant,
    ) -> Result<QueryResult> {
        let enhanced = preprocess::preprocess(question, &options.recent_turns);
        let cache_key = format!("{}|{}", options.style.tag(), enhanced);

        if let Some(mut cached) = self.result_cache.get(&cache_key) {
            tracing::debug!("query served from result cache");
            cached.metrics.cache_hit = true;
            cached.processing_time = start.elapsed();
            return Ok(cached);
        }

        let channels = self.channels.as_ref().ok_or_else(|| {
            VitaeqError::Config("router not initialized".to_string())
        })?;

        // Embed the enhanced query, consulting the embedding cache first
        let query_embedding = match self.embedding_cache.get(&enhanced) {
            Some(embedding) => embedding,
            None => {
                let embedding = request_embedding(&channels.embedding, &enhanced).await?;
                self.embedding_cache.put(&enhanced, &embedding);
                embedding
            }
        };

        // Regenerate any chunk embedding that is missing or has a stale
        // dimensionality before comparing; mismatched vectors are never
        // silently scored
        let dimensions = query_embedding.len();
        self.embedding_dimensions = Some(dimensions);
        embed_stale_chunks(
            &channels.embedding,
            &mut self.chunks,
            &mut self.embedding_cache,
            dimensions,
        )
        .await?;

        let ranked = find_similar(&query_embedding, &self.chunks, self.config.max_context_chunks);
        let filtered = apply_threshold(
            &ranked,
            self.config.similarity_threshold,
            self.config.max_context_chunks,
        );
        tracing::debug!(
            "retrieval: {} ranked, {} above base threshold",
            ranked.len(),
            filtered.len()
        );

        let outcome = match intent {
            QueryIntent::FactRetrieval => {
                answer_fact(
                    question,
                    &filtered,
                    options,
                    &channels.eqa,
                    &channels.generation,
                    &self.config,
                )
                .await
            }
            QueryIntent::Conversational => {
                answer_conversational(
                    question,
                    &filtered,
                    options,
                    &channels.generation,
                    &self.config,
                )
                .await
            }
        };

        let chunks_used = outcome.matched_chunks.len();
        let result = QueryResult {
            answer: outcome.answer,
            confidence: outcome.confidence,
            intent,
            method: outcome.method,
            matched_chunks: outcome.matched_chunks,
            processing_time: start.elapsed(),
            metrics: QueryMetrics {
                chunks_considered: self.chunks.len(),
                chunks_used,
                cache_hit: false,
                fallbacks: outcome.fallbacks,
                quality_score: outcome.quality_score,
            },
        };

        // Transport-failure results are not worth pinning for the TTL
        if result.method != AnswerMethod::Error {
            self.result_cache.put(cache_key, &result);
        }
        Ok(result)
    }

    /// Snapshot of initialization and worker state
    pub fn status(&self) -> RouterStatus {
        let (workers_ready, pending) = match &self.channels {
            Some(channels) => (
                channels.embedding.is_ready()
                    && channels.generation.is_ready()
                    && channels.eqa.is_ready(),
                channels.embedding.pending_count()
                    + channels.generation.pending_count()
                    + channels.eqa.pending_count(),
            ),
            None => (false, 0),
        };
        RouterStatus {
            initialized: self.channels.is_some(),
            workers_ready,
            chunks_loaded: self.chunks.len(),
            pending_request_count: pending,
        }
    }

    /// Terminate all workers and drop every pending request unresolved
    ///
    /// The only way to reclaim a stuck service; follow with `initialize`
    /// to recover.
    pub fn cleanup(&mut self) {
        if let Some(mut channels) = self.channels.take() {
            channels.embedding.terminate();
            channels.generation.terminate();
            channels.eqa.terminate();
            tracing::info!("router cleaned up; all workers terminated");
        }
        self.chunks.clear();
        self.embedding_dimensions = None;
    }

    /// Chunks currently loaded (embeddings filled as they are computed)
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }
}

async fn request_embedding(channel: &RequestChannel, text: &str) -> Result<Vec<f32>> {
    match channel
        .send(RequestPayload::GenerateEmbedding {
            text: text.to_string(),
        })
        .await?
    {
        ResponsePayload::Embedding { embedding } => Ok(embedding),
        _ => Err(VitaeqError::UnexpectedResponse(
            "generateEmbedding".to_string(),
        )),
    }
}

async fn request_batch_embeddings(
    channel: &RequestChannel,
    texts: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let count = texts.len();
    match channel
        .send(RequestPayload::GenerateBatchEmbeddings { texts })
        .await?
    {
        ResponsePayload::Embeddings { embeddings } if embeddings.len() == count => Ok(embeddings),
        ResponsePayload::Embeddings { embeddings } => Err(VitaeqError::WorkerRuntime(format!(
            "batch embedding count mismatch: sent {}, got {}",
            count,
            embeddings.len()
        ))),
        _ => Err(VitaeqError::UnexpectedResponse(
            "generateBatchEmbeddings".to_string(),
        )),
    }
}

/// Pre-embed every chunk lacking a vector; returns the observed
/// dimensionality (None for an empty knowledge base)
async fn prepare_chunks(
    embedding: &RequestChannel,
    chunks: &mut [Chunk],
    cache: &mut EmbeddingCache,
) -> Result<Option<usize>> {
    let missing: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| c.embedding.is_none())
        .map(|(i, _)| i)
        .collect();

    // Freshly computed vectors are the authority on dimensionality; fall
    // back to the first stored vector only when nothing needed embedding
    let mut dimensions: Option<usize> = None;
    if !missing.is_empty() {
        let texts: Vec<String> = missing.iter().map(|&i| chunks[i].text.clone()).collect();
        let embeddings = request_batch_embeddings(embedding, texts).await?;
        dimensions = embeddings.first().map(|e| e.len());
        for (&index, vector) in missing.iter().zip(embeddings) {
            cache.put(&chunks[index].text, &vector);
            chunks[index].embedding = Some(vector);
        }
    }
    if dimensions.is_none() {
        dimensions = chunks
            .iter()
            .find_map(|c| c.embedding.as_ref().map(|e| e.len()));
    }

    // Regenerate anything that came in with a stale dimensionality
    if let Some(dimensions) = dimensions {
        let stale: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.has_embedding_of(dimensions))
            .map(|(i, _)| i)
            .collect();
        if !stale.is_empty() {
            tracing::warn!(
                "{} chunks had mismatched embedding dimensions, regenerating",
                stale.len()
            );
            let texts: Vec<String> = stale.iter().map(|&i| chunks[i].text.clone()).collect();
            let embeddings = request_batch_embeddings(embedding, texts).await?;
            for (&index, vector) in stale.iter().zip(embeddings) {
                cache.put(&chunks[index].text, &vector);
                chunks[index].embedding = Some(vector);
            }
        }
    }

    Ok(dimensions)
}

/// Embed, on demand, any chunk whose vector is absent or of the wrong
/// dimensionality for the current query embedding
async fn embed_stale_chunks(
    embedding: &RequestChannel,
    chunks: &mut [Chunk],
    cache: &mut EmbeddingCache,
    dimensions: usize,
) -> Result<()> {
    let stale: Vec<usize> = chunks
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.has_embedding_of(dimensions))
        .map(|(i, _)| i)
        .collect();
    if stale.is_empty() {
        return Ok(());
    }

    tracing::debug!("embedding {} stale chunks on demand", stale.len());
    let texts: Vec<String> = stale.iter().map(|&i| chunks[i].text.clone()).collect();
    let embeddings = request_batch_embeddings(embedding, texts).await?;
    for (&index, vector) in stale.iter().zip(embeddings) {
        cache.put(&chunks[index].text, &vector);
        chunks[index].embedding = Some(vector);
    }
    Ok(())
}
