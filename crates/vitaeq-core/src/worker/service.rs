//! Worker services and thread lifecycle
//!
//! Each inference service runs on its own named OS thread and is reachable
//! only through message passing; every value crossing the boundary is
//! owned. Backends are injected at router construction, so tests swap in
//! in-process mocks and production uses HTTP services.

use crate::config::RouterConfig;
use crate::error::{Result, VitaeqError};
use crate::worker::protocol::{RequestPayload, ResponsePayload, WireRequest, WorkerMessage};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

/// An inference service implementation, driven from its worker thread
///
/// `load` runs once before the worker signals ready; implementations that
/// download or initialize model weights report progress through the
/// callback and return `loads_model() == true` so the router applies the
/// extended startup timeout.
pub trait InferenceBackend: Send + 'static {
    /// Prepare the service; called once on the worker thread
    fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
        let _ = progress;
        Ok(())
    }

    /// Serve one request
    fn handle(&mut self, request: RequestPayload) -> Result<ResponsePayload>;

    /// Whether `load` may take minutes rather than seconds
    fn loads_model(&self) -> bool {
        false
    }
}

/// The three injected services a router orchestrates
pub struct BackendSet {
    pub embedding: Box<dyn InferenceBackend>,
    pub generation: Box<dyn InferenceBackend>,
    pub eqa: Box<dyn InferenceBackend>,
}

impl BackendSet {
    /// Production set: three HTTP services at the configured paths
    pub fn http(config: &RouterConfig) -> Result<Self> {
        Ok(Self {
            embedding: Box::new(HttpBackend::new(
                &config.embedding_service_path,
                config.request_timeout,
            )?),
            generation: Box::new(HttpBackend::new(
                &config.generation_service_path,
                config.request_timeout,
            )?),
            eqa: Box::new(HttpBackend::new(
                &config.eqa_service_path,
                config.request_timeout,
            )?),
        })
    }
}

/// Handle to a spawned worker thread
///
/// Dropping the handle closes the worker's inbox, which ends its serve
/// loop. There is no abort protocol for an in-flight request: a timed-out
/// computation keeps running on the worker until it finishes and its reply
/// is discarded.
pub struct WorkerHandle {
    sender: mpsc::UnboundedSender<WireRequest>,
}

impl WorkerHandle {
    /// Transmit a request envelope to the worker
    pub fn transmit(&self, request: WireRequest) -> Result<()> {
        self.sender
            .send(request)
            .map_err(|_| VitaeqError::ChannelClosed("worker inbox closed".to_string()))
    }
}

/// Spawn `backend` on a dedicated thread serving requests until its inbox
/// closes. All replies and lifecycle signals flow through `outbound`.
pub fn spawn_worker(
    name: &str,
    mut backend: Box<dyn InferenceBackend>,
    outbound: mpsc::UnboundedSender<WorkerMessage>,
) -> Result<WorkerHandle> {
    let (sender, mut inbox) = mpsc::unbounded_channel::<WireRequest>();
    let service = name.to_string();

    std::thread::Builder::new()
        .name(format!("vitaeq-{}", name))
        .spawn(move || {
            {
                let mut report = |percent: u8| {
                    let _ = outbound.send(WorkerMessage::Progress { percent });
                };
                match backend.load(&mut report) {
                    Ok(()) => {
                        let _ = outbound.send(WorkerMessage::Ready {
                            success: true,
                            error: None,
                        });
                    }
                    Err(e) => {
                        tracing::error!("worker '{}' failed to load: {}", service, e);
                        let _ = outbound.send(WorkerMessage::Ready {
                            success: false,
                            error: Some(e.to_string()),
                        });
                        return;
                    }
                }
            }

            while let Some(request) = inbox.blocking_recv() {
                let request_id = request.request_id;
                let reply = match backend.handle(request.payload) {
                    Ok(payload) => WorkerMessage::ok(request_id, payload),
                    Err(e) => WorkerMessage::err(request_id, e.to_string()),
                };
                if outbound.send(reply).is_err() {
                    break;
                }
            }
            tracing::debug!("worker '{}' inbox closed, exiting", service);
        })
        .map_err(VitaeqError::Io)?;

    Ok(WorkerHandle { sender })
}

/// HTTP inference service client
///
/// Speaks a small JSON API rooted at the service path: `/health`,
/// `/embed`, `/embed_batch`, `/generate`, `/extract`. Runs on the worker
/// thread, so the blocking reqwest client is the right tool.
pub struct HttpBackend {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct EmbedBatchResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String,
    #[serde(default)]
    confidence: Option<f32>,
}

#[derive(Deserialize)]
struct ExtractResponse {
    answer: String,
    confidence: f32,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn post<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self.client.post(&url).json(&body).send()?;
        if !response.status().is_success() {
            return Err(VitaeqError::WorkerRuntime(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json()?)
    }
}

impl InferenceBackend for HttpBackend {
    fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send()?;
        if !response.status().is_success() {
            return Err(VitaeqError::WorkerRuntime(format!(
                "health check at {} returned {}",
                url,
                response.status()
            )));
        }
        progress(100);
        Ok(())
    }

    fn handle(&mut self, request: RequestPayload) -> Result<ResponsePayload> {
        match request {
            RequestPayload::GenerateEmbedding { text } => {
                let r: EmbedResponse = self.post("embed", json!({ "text": text }))?;
                Ok(ResponsePayload::Embedding {
                    embedding: r.embedding,
                })
            }
            RequestPayload::GenerateBatchEmbeddings { texts } => {
                let r: EmbedBatchResponse = self.post("embed_batch", json!({ "texts": texts }))?;
                Ok(ResponsePayload::Embeddings {
                    embeddings: r.embeddings,
                })
            }
            RequestPayload::Generate {
                prompt,
                max_tokens,
                temperature,
            } => {
                let r: GenerateResponse = self.post(
                    "generate",
                    json!({
                        "prompt": prompt,
                        "max_tokens": max_tokens,
                        "temperature": temperature,
                    }),
                )?;
                Ok(ResponsePayload::Generated {
                    text: r.text,
                    confidence: r.confidence,
                })
            }
            RequestPayload::ExtractAnswer { question, context } => {
                let r: ExtractResponse = self.post(
                    "extract",
                    json!({ "question": question, "context": context }),
                )?;
                Ok(ResponsePayload::ExtractedAnswer {
                    answer: r.answer,
                    confidence: r.confidence,
                })
            }
        }
    }

    fn loads_model(&self) -> bool {
        true
    }
}
