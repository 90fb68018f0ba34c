//! Worker threads and the message protocol that reaches them
//!
//! Provides:
//! - Wire request/response envelopes with correlation ids
//! - `RequestChannel`, the async request/response link to one worker
//! - `InferenceBackend`, the injectable service run on a worker thread

pub mod channel;
pub mod protocol;
pub mod service;

pub use channel::{ReadyState, RequestChannel};
pub use protocol::{RequestPayload, ResponsePayload, WireRequest, WorkerMessage};
pub use service::{spawn_worker, BackendSet, HttpBackend, InferenceBackend, WorkerHandle};
