//! Shared fixtures for ivs-api integration tests
//!
//! In-process fakes for the model and retrieval collaborators, request
//! builders and an SSE body reader.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use ivs_api::config::ServerConfig;
use ivs_api::model::{ModelError, ModelReply, ReasoningModel, TokenUsage, VisionModel};
use ivs_api::pipeline::{DescriptionPipeline, ValuationPipeline};
use ivs_api::retrieval::{RetrievalError, RetrievalStore};
use ivs_api::{build_router, AppState};
use ivs_common::sse::SseDecoder;
use ivs_common::{RetrievedDocument, StreamEvent};
use serde_json::{Map, Value};
use std::sync::{Arc, Mutex};

pub const MAX_UPLOAD_BYTES: usize = 1024 * 1024;
pub const TOP_K: usize = 4;
pub const CONTEXT_MAX_CHARS: usize = 6000;

/// Smallest header `infer` recognizes as PNG
pub const PNG_BYTES: &[u8] = &[
    0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D, b'I', b'H', b'D', b'R',
];

pub const DESCRIPTION_REPLY: &str = "Here is the result:\n```json\n{\"category\": \"Electric guitar\", \
    \"brand\": \"Fender\", \"model\": \"Stratocaster\", \"year\": null, \"condition\": \"Light wear\", \
    \"materials\": [\"alder\", \"maple\"], \"features\": [\"tremolo\"], \"notes\": \"\"}\n```";

pub const VALUATION_REPLY: &str = "{\"price_jpy\": 120000, \"range_jpy\": [100000, 140000], \
    \"confidence\": 0.7, \"rationale\": \"類似品の相場\", \"evidence\": [\"Fender American Standard 148,000円\"]}";

/// What a fake model call does
#[derive(Clone)]
pub enum Behavior {
    Reply(ModelReply),
    Fail,
    /// Never completes
    Hang,
}

impl Behavior {
    pub fn text(text: &str) -> Self {
        Behavior::Reply(ModelReply::text(text))
    }

    /// Reply with one reasoning line and usage
    pub fn narrated(text: &str) -> Self {
        Behavior::Reply(ModelReply {
            text: text.to_string(),
            reasoning: vec!["Checked the headstock logo.".to_string()],
            usage: Some(TokenUsage {
                input_tokens: 1000,
                output_tokens: 50,
                total_tokens: 1050,
            }),
        })
    }

    async fn perform(&self) -> Result<ModelReply, ModelError> {
        match self {
            Behavior::Reply(reply) => Ok(reply.clone()),
            Behavior::Fail => Err(ModelError::Status {
                status: 503,
                body: "upstream unavailable".to_string(),
            }),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

pub struct FakeVision {
    pub behavior: Behavior,
    pub seen_urls: Mutex<Vec<String>>,
}

impl FakeVision {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            seen_urls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl VisionModel for FakeVision {
    async fn describe_image(&self, image_data_url: &str) -> Result<ModelReply, ModelError> {
        self.seen_urls.lock().unwrap().push(image_data_url.to_string());
        self.behavior.perform().await
    }
}

pub struct FakeReasoning {
    pub behavior: Behavior,
    /// (target, references) per call
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeReasoning {
    pub fn new(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ReasoningModel for FakeReasoning {
    async fn estimate(&self, target: &str, references: &str) -> Result<ModelReply, ModelError> {
        self.calls
            .lock()
            .unwrap()
            .push((target.to_string(), references.to_string()));
        self.behavior.perform().await
    }
}

pub struct FakeStore {
    pub docs: Vec<RetrievedDocument>,
    pub fail: bool,
    pub queries: Mutex<Vec<(String, usize)>>,
}

impl FakeStore {
    pub fn with_docs(docs: Vec<RetrievedDocument>) -> Arc<Self> {
        Arc::new(Self {
            docs,
            fail: false,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            docs: Vec::new(),
            fail: true,
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl RetrievalStore for FakeStore {
    async fn query(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, RetrievalError> {
        self.queries.lock().unwrap().push((query.to_string(), k));
        if self.fail {
            return Err(RetrievalError::Embedding(ModelError::Transport(
                "connection refused".to_string(),
            )));
        }
        Ok(self.docs.iter().take(k).cloned().collect())
    }

    fn len(&self) -> usize {
        self.docs.len()
    }
}

pub fn reference(title: &str, price: i64, content: &str) -> RetrievedDocument {
    let mut metadata = Map::new();
    metadata.insert("title".into(), Value::from(title));
    metadata.insert("price_jpy".into(), Value::from(price));
    metadata.insert("source".into(), Value::from("used shop listing"));
    RetrievedDocument {
        content: content.to_string(),
        metadata,
        score: 0.8,
    }
}

pub fn test_state(
    vision: Arc<FakeVision>,
    reasoning: Arc<FakeReasoning>,
    store: Arc<FakeStore>,
) -> AppState {
    let description = Arc::new(DescriptionPipeline::new(vision, MAX_UPLOAD_BYTES));
    let valuation = Arc::new(ValuationPipeline::new(
        store,
        reasoning,
        TOP_K,
        CONTEXT_MAX_CHARS,
    ));
    AppState::new(description, valuation)
}

pub fn test_router(state: AppState) -> Router {
    let server = ServerConfig {
        max_upload_bytes: MAX_UPLOAD_BYTES,
        ..ServerConfig::default()
    };
    build_router(state, &server)
}

const BOUNDARY: &str = "ivs-test-boundary";

/// Multipart form with a single file field
pub fn multipart_request(uri: &str, field: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"photo\"\r\n\
             Content-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn json_request(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Read a complete SSE body and decode every event
pub async fn read_events(response: Response) -> Vec<StreamEvent> {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let mut decoder = SseDecoder::new();
    let mut frames = decoder.push(&bytes);
    frames.extend(decoder.finish());
    frames
        .iter()
        .map(|frame| frame.to_stream_event().unwrap())
        .collect()
}
