//! Wire protocol between the router and its worker services
//!
//! Every request carries a correlation id; the matching response echoes it
//! back. Lifecycle signals (ready, progress) carry no id and never touch
//! the correlation table.

use serde::{Deserialize, Serialize};

/// Request envelope sent to a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRequest {
    pub request_id: u64,
    #[serde(flatten)]
    pub payload: RequestPayload,
}

/// Type-specific request payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum RequestPayload {
    GenerateEmbedding {
        text: String,
    },
    GenerateBatchEmbeddings {
        texts: Vec<String>,
    },
    Generate {
        prompt: String,
        max_tokens: usize,
        temperature: f32,
    },
    ExtractAnswer {
        question: String,
        context: String,
    },
}

impl RequestPayload {
    /// Wire name of the request type, used in logs and timeout errors
    pub fn type_name(&self) -> &'static str {
        match self {
            RequestPayload::GenerateEmbedding { .. } => "generateEmbedding",
            RequestPayload::GenerateBatchEmbeddings { .. } => "generateBatchEmbeddings",
            RequestPayload::Generate { .. } => "generate",
            RequestPayload::ExtractAnswer { .. } => "extractAnswer",
        }
    }
}

/// Type-specific response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ResponsePayload {
    Embedding {
        embedding: Vec<f32>,
    },
    Embeddings {
        embeddings: Vec<Vec<f32>>,
    },
    Generated {
        text: String,
        /// Model-reported confidence; strategies default it when absent
        confidence: Option<f32>,
    },
    ExtractedAnswer {
        answer: String,
        confidence: f32,
    },
}

/// Everything a worker can send back to the router
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum WorkerMessage {
    /// Correlated reply to a `WireRequest`
    #[serde(rename_all = "camelCase")]
    Response {
        request_id: u64,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<ResponsePayload>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Startup complete; `success: false` is fatal for `initialize`
    Ready {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Model download/load progress, forwarded verbatim to the progress
    /// callback
    Progress {
        percent: u8,
    },
}

impl WorkerMessage {
    pub fn ok(request_id: u64, payload: ResponsePayload) -> Self {
        WorkerMessage::Response {
            request_id,
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn err(request_id: u64, error: impl Into<String>) -> Self {
        WorkerMessage::Response {
            request_id,
            success: false,
            payload: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = WireRequest {
            request_id: 7,
            payload: RequestPayload::ExtractAnswer {
                question: "How many years?".into(),
                context: "Has 5 years of React experience.".into(),
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requestId"], 7);
        assert_eq!(json["type"], "extractAnswer");
        assert_eq!(json["payload"]["question"], "How many years?");
    }

    #[test]
    fn test_response_round_trip() {
        let message = WorkerMessage::ok(
            3,
            ResponsePayload::ExtractedAnswer {
                answer: "5 years".into(),
                confidence: 0.6,
            },
        );
        let json = serde_json::to_string(&message).unwrap();
        let back: WorkerMessage = serde_json::from_str(&json).unwrap();
        match back {
            WorkerMessage::Response {
                request_id,
                success,
                payload: Some(ResponsePayload::ExtractedAnswer { answer, .. }),
                ..
            } => {
                assert_eq!(request_id, 3);
                assert!(success);
                assert_eq!(answer, "5 years");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_lifecycle_signals_have_no_request_id() {
        let json = serde_json::to_value(WorkerMessage::Ready {
            success: true,
            error: None,
        })
        .unwrap();
        assert!(json.get("requestId").is_none());
    }
}
