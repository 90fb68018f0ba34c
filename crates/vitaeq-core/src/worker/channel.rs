//! Asynchronous request/response correlation over one worker link
//!
//! Each in-flight request lives in a correlation table keyed by id and is
//! removed exactly once, by whichever of {matching response, timeout} gets
//! there first. Removal is a single `HashMap::remove`, so the losing path
//! finds nothing and does nothing; double resolution cannot occur.
//! Lifecycle signals carry no id and never touch the table.

use crate::config::ProgressCallback;
use crate::error::{Result, VitaeqError};
use crate::worker::protocol::{RequestPayload, ResponsePayload, WireRequest, WorkerMessage};
use crate::worker::service::{spawn_worker, InferenceBackend, WorkerHandle};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Startup state of a worker as observed through its lifecycle signals
#[derive(Debug, Clone, PartialEq)]
pub enum ReadyState {
    Starting,
    LoadingModel,
    Ready,
    Failed(String),
}

struct PendingRequest {
    reply: oneshot::Sender<Result<ResponsePayload>>,
    request_type: &'static str,
}

type PendingTable = Arc<Mutex<HashMap<u64, PendingRequest>>>;

/// Request/response channel to one worker thread with per-request timeout
pub struct RequestChannel {
    service: String,
    handle: Option<WorkerHandle>,
    pending: PendingTable,
    next_id: AtomicU64,
    ready: watch::Receiver<ReadyState>,
    timeout: Duration,
}

impl RequestChannel {
    /// Spawn `backend` on its worker thread and open a channel to it
    pub fn spawn(
        service: &str,
        backend: Box<dyn InferenceBackend>,
        timeout: Duration,
        progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<WorkerMessage>();
        let (ready_tx, ready_rx) = watch::channel(ReadyState::Starting);
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));

        let handle = spawn_worker(service, backend, outbound_tx)?;

        tokio::spawn(dispatch(
            service.to_string(),
            outbound_rx,
            Arc::clone(&pending),
            ready_tx,
            progress,
        ));

        Ok(Self {
            service: service.to_string(),
            handle: Some(handle),
            pending,
            next_id: AtomicU64::new(1),
            ready: ready_rx,
            timeout,
        })
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Wait for the worker's ready signal, failing on a startup error
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut ready = self.ready.clone();
        let settled = tokio::time::timeout(
            timeout,
            ready.wait_for(|s| matches!(s, ReadyState::Ready | ReadyState::Failed(_))),
        )
        .await;

        match settled {
            Ok(Ok(state)) => match &*state {
                ReadyState::Ready => Ok(()),
                ReadyState::Failed(reason) => Err(VitaeqError::WorkerInitFailure {
                    service: self.service.clone(),
                    reason: reason.clone(),
                }),
                _ => unreachable!("wait_for only yields settled states"),
            },
            Ok(Err(_)) => Err(VitaeqError::WorkerInitFailure {
                service: self.service.clone(),
                reason: "worker exited before signalling ready".to_string(),
            }),
            Err(_) => Err(VitaeqError::WorkerInitTimeout {
                service: self.service.clone(),
            }),
        }
    }

    /// Whether the worker has signalled successful startup
    pub fn is_ready(&self) -> bool {
        matches!(*self.ready.borrow(), ReadyState::Ready)
    }

    /// Issue one request and await its correlated reply
    ///
    /// Rejects with `RequestTimeout` if no reply arrives within the
    /// per-request timeout; the worker is not told to abort, so it may
    /// finish a discarded computation.
    pub async fn send(&self, payload: RequestPayload) -> Result<ResponsePayload> {
        let handle = self
            .handle
            .as_ref()
            .ok_or_else(|| VitaeqError::ChannelClosed(format!("{} terminated", self.service)))?;

        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request_type = payload.type_name();
        let (reply_tx, reply_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().expect("pending table poisoned");
            pending.insert(
                request_id,
                PendingRequest {
                    reply: reply_tx,
                    request_type,
                },
            );
        }

        if let Err(e) = handle.transmit(WireRequest {
            request_id,
            payload,
        }) {
            self.remove_pending(request_id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(VitaeqError::ChannelClosed(format!(
                "{} dropped pending '{}' request",
                self.service, request_type
            ))),
            Err(_) => {
                // Losing race: if the response landed between the timer
                // firing and this removal, the entry is already gone and
                // the resolved value is simply discarded.
                self.remove_pending(request_id);
                tracing::warn!(
                    "request '{}' to {} timed out after {:?}",
                    request_type,
                    self.service,
                    self.timeout
                );
                Err(VitaeqError::RequestTimeout {
                    request_type: request_type.to_string(),
                })
            }
        }
    }

    fn remove_pending(&self, request_id: u64) -> Option<PendingRequest> {
        self.pending
            .lock()
            .expect("pending table poisoned")
            .remove(&request_id)
    }

    /// Number of requests awaiting replies
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("pending table poisoned").len()
    }

    /// Drop every pending entry without resolving it
    pub fn abandon_all(&self) {
        let mut pending = self.pending.lock().expect("pending table poisoned");
        let abandoned = pending.len();
        pending.clear();
        if abandoned > 0 {
            tracing::debug!("{}: abandoned {} pending requests", self.service, abandoned);
        }
    }

    /// Terminate the worker: close its inbox and abandon all pending
    /// requests. The only recovery afterwards is a fresh spawn.
    pub fn terminate(&mut self) {
        self.handle = None;
        self.abandon_all();
    }
}

/// Route worker messages: correlated replies resolve their table entry,
/// lifecycle signals update ready state or forward progress.
async fn dispatch(
    service: String,
    mut outbound: mpsc::UnboundedReceiver<WorkerMessage>,
    pending: PendingTable,
    ready: watch::Sender<ReadyState>,
    progress: Option<ProgressCallback>,
) {
    while let Some(message) = outbound.recv().await {
        match message {
            WorkerMessage::Response {
                request_id,
                success,
                payload,
                error,
            } => {
                let entry = pending
                    .lock()
                    .expect("pending table poisoned")
                    .remove(&request_id);
                let Some(entry) = entry else {
                    // Timed out (or abandoned) before the reply arrived
                    tracing::debug!(
                        "{}: discarding reply for request {} with no pending entry",
                        service,
                        request_id
                    );
                    continue;
                };

                let result = if success {
                    payload.ok_or_else(|| {
                        VitaeqError::UnexpectedResponse(entry.request_type.to_string())
                    })
                } else {
                    Err(VitaeqError::WorkerRuntime(
                        error.unwrap_or_else(|| "unspecified worker error".to_string()),
                    ))
                };
                let _ = entry.reply.send(result);
            }
            WorkerMessage::Ready { success, error } => {
                let state = if success {
                    ReadyState::Ready
                } else {
                    ReadyState::Failed(
                        error.unwrap_or_else(|| "unspecified startup failure".to_string()),
                    )
                };
                let _ = ready.send(state);
            }
            WorkerMessage::Progress { percent } => {
                if percent < 100 && matches!(*ready.borrow(), ReadyState::Starting) {
                    let _ = ready.send(ReadyState::LoadingModel);
                }
                if let Some(cb) = &progress {
                    cb(&service, percent);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct EchoBackend;

    impl InferenceBackend for EchoBackend {
        fn handle(&mut self, request: RequestPayload) -> Result<ResponsePayload> {
            match request {
                RequestPayload::GenerateEmbedding { text } => Ok(ResponsePayload::Embedding {
                    embedding: vec![text.len() as f32],
                }),
                _ => Err(VitaeqError::WorkerRuntime("unsupported".to_string())),
            }
        }
    }

    /// Sleeps on the first request only, so follow-up requests can verify
    /// the table survived a timeout
    struct SlowBackend {
        delay: Duration,
        calls: usize,
    }

    impl InferenceBackend for SlowBackend {
        fn handle(&mut self, _request: RequestPayload) -> Result<ResponsePayload> {
            if self.calls == 0 {
                std::thread::sleep(self.delay);
            }
            self.calls += 1;
            Ok(ResponsePayload::Embedding {
                embedding: vec![1.0],
            })
        }
    }

    struct FailingStartBackend;

    impl InferenceBackend for FailingStartBackend {
        fn load(&mut self, _progress: &mut dyn FnMut(u8)) -> Result<()> {
            Err(VitaeqError::WorkerRuntime("weights missing".to_string()))
        }

        fn handle(&mut self, _request: RequestPayload) -> Result<ResponsePayload> {
            unreachable!()
        }
    }

    fn embed_request(text: &str) -> RequestPayload {
        RequestPayload::GenerateEmbedding {
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_resolves_with_reply() {
        let channel = RequestChannel::spawn(
            "embedding",
            Box::new(EchoBackend),
            Duration::from_secs(2),
            None,
        )
        .unwrap();
        channel.wait_ready(Duration::from_secs(2)).await.unwrap();

        let response = channel.send(embed_request("hello")).await.unwrap();
        match response {
            ResponsePayload::Embedding { embedding } => assert_eq!(embedding, vec![5.0]),
            other => panic!("unexpected payload: {:?}", other),
        }
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_worker_error_rejects_pending() {
        let channel = RequestChannel::spawn(
            "embedding",
            Box::new(EchoBackend),
            Duration::from_secs(2),
            None,
        )
        .unwrap();
        channel.wait_ready(Duration::from_secs(2)).await.unwrap();

        let err = channel
            .send(RequestPayload::ExtractAnswer {
                question: "q".into(),
                context: "c".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, VitaeqError::WorkerRuntime(_)));
        assert_eq!(channel.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_removes_pending_exactly_once() {
        let channel = RequestChannel::spawn(
            "embedding",
            Box::new(SlowBackend {
                delay: Duration::from_millis(200),
                calls: 0,
            }),
            Duration::from_millis(50),
            None,
        )
        .unwrap();
        channel.wait_ready(Duration::from_secs(2)).await.unwrap();

        let err = channel.send(embed_request("slow")).await.unwrap_err();
        assert!(matches!(err, VitaeqError::RequestTimeout { .. }));
        assert_eq!(channel.pending_count(), 0);

        // The late reply finds no pending entry and is discarded; a fresh
        // request afterwards still works (no table corruption).
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(channel.pending_count(), 0);
        let response = channel.send(embed_request("ok")).await.unwrap();
        assert!(matches!(response, ResponsePayload::Embedding { .. }));
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let channel = RequestChannel::spawn(
            "generation",
            Box::new(FailingStartBackend),
            Duration::from_secs(1),
            None,
        )
        .unwrap();

        let err = channel.wait_ready(Duration::from_secs(2)).await.unwrap_err();
        match err {
            VitaeqError::WorkerInitFailure { service, reason } => {
                assert_eq!(service, "generation");
                assert!(reason.contains("weights missing"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_terminate_abandons_pending() {
        let mut channel = RequestChannel::spawn(
            "embedding",
            Box::new(SlowBackend {
                delay: Duration::from_millis(500),
                calls: 0,
            }),
            Duration::from_secs(5),
            None,
        )
        .unwrap();
        channel.wait_ready(Duration::from_secs(2)).await.unwrap();

        // Register a pending entry directly, then terminate underneath it
        let pending = Arc::clone(&channel.pending);
        let (tx, mut rx) = oneshot::channel();
        pending.lock().unwrap().insert(
            99,
            PendingRequest {
                reply: tx,
                request_type: "generateEmbedding",
            },
        );
        assert_eq!(channel.pending_count(), 1);

        channel.terminate();
        assert_eq!(channel.pending_count(), 0);
        // Abandoned without resolution: the receiver observes closure
        assert!(rx.try_recv().is_err());

        let err = channel.send(embed_request("x")).await.unwrap_err();
        assert!(matches!(err, VitaeqError::ChannelClosed(_)));
    }

    #[tokio::test]
    async fn test_progress_forwarded_to_callback() {
        struct ProgressBackend;
        impl InferenceBackend for ProgressBackend {
            fn load(&mut self, progress: &mut dyn FnMut(u8)) -> Result<()> {
                progress(40);
                progress(100);
                Ok(())
            }
            fn handle(&mut self, _request: RequestPayload) -> Result<ResponsePayload> {
                Err(VitaeqError::WorkerRuntime("unused".to_string()))
            }
            fn loads_model(&self) -> bool {
                true
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_cb = Arc::clone(&seen);
        let channel = RequestChannel::spawn(
            "embedding",
            Box::new(ProgressBackend),
            Duration::from_secs(1),
            Some(Arc::new(move |service, _percent| {
                assert_eq!(service, "embedding");
                seen_cb.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

        channel.wait_ready(Duration::from_secs(2)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
