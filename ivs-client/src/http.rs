//! HTTP access to the valuation service
//!
//! [`ValuationBackend`] is the seam the session drives; [`ApiClient`] is
//! the reqwest implementation against `ivs-api`.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use ivs_common::sse::SseDecoder;
use ivs_common::{InstrumentDescription, Phase, PhaseResult, StreamEvent, ValuationResult};
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;

/// Decoded events of one streamed run
pub type EventStream = BoxStream<'static, Result<StreamEvent, ClientError>>;

/// Photo file as sent in the multipart `image` field
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub bytes: Vec<u8>,
    pub mime: String,
    pub file_name: String,
}

impl ImageFile {
    /// Content type from the magic bytes, `application/octet-stream` if unknown
    pub fn from_bytes(bytes: Vec<u8>, file_name: impl Into<String>) -> Self {
        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type())
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            bytes,
            mime,
            file_name: file_name.into(),
        }
    }
}

/// Input of one phase run
#[derive(Debug, Clone)]
pub enum PhaseRequest {
    Describe(ImageFile),
    Estimate(InstrumentDescription),
}

impl PhaseRequest {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseRequest::Describe(_) => Phase::Vision,
            PhaseRequest::Estimate(_) => Phase::Rag,
        }
    }
}

#[async_trait]
pub trait ValuationBackend: Send + Sync {
    /// Start a streamed run
    async fn open_stream(&self, request: &PhaseRequest) -> Result<EventStream, ClientError>;

    /// Run synchronously and return the result payload
    async fn request(&self, request: &PhaseRequest) -> Result<PhaseResult, ClientError>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("ivs-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, request: &PhaseRequest, stream: bool) -> String {
        let path = match request {
            PhaseRequest::Describe(_) => "/api/describe",
            PhaseRequest::Estimate(_) => "/api/estimate",
        };
        let suffix = if stream { "/stream" } else { "" };
        format!("{}{path}{suffix}", self.base_url)
    }

    async fn send(
        &self,
        request: &PhaseRequest,
        stream: bool,
    ) -> Result<reqwest::Response, ClientError> {
        let builder = self.http.post(self.endpoint(request, stream));
        let builder = match request {
            PhaseRequest::Describe(image) => {
                let part = reqwest::multipart::Part::bytes(image.bytes.clone())
                    .file_name(image.file_name.clone())
                    .mime_str(&image.mime)?;
                builder.multipart(reqwest::multipart::Form::new().part("image", part))
            }
            PhaseRequest::Estimate(description) => builder.json(description),
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClientError::Server {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}

/// Turn a raw SSE body into decoded events. Stops after the first error.
pub fn decode_body<S, B, E>(body: S) -> EventStream
where
    S: futures::Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let events = stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    yield Err::<StreamEvent, ClientError>(ClientError::StreamTransport(err.to_string()));
                    return;
                }
            };
            for frame in decoder.push(chunk.as_ref()) {
                match frame.to_stream_event() {
                    Ok(event) => yield Ok(event),
                    Err(err) => {
                        yield Err(ClientError::Decode(err));
                        return;
                    }
                }
            }
        }

        if let Some(frame) = decoder.finish() {
            yield frame.to_stream_event().map_err(ClientError::Decode);
        }
    };
    events.boxed()
}

#[async_trait]
impl ValuationBackend for ApiClient {
    async fn open_stream(&self, request: &PhaseRequest) -> Result<EventStream, ClientError> {
        let response = self.send(request, true).await.map_err(|err| match err {
            ClientError::Http(err) => ClientError::StreamTransport(err.to_string()),
            other => other,
        })?;
        debug!(phase = %request.phase(), "Event stream opened");
        Ok(decode_body(response.bytes_stream()))
    }

    async fn request(&self, request: &PhaseRequest) -> Result<PhaseResult, ClientError> {
        let response = self.send(request, false).await?;
        let body = response.text().await?;
        let result = match request.phase() {
            Phase::Vision => serde_json::from_str::<InstrumentDescription>(&body)
                .map(PhaseResult::Vision),
            Phase::Rag => serde_json::from_str::<ValuationResult>(&body).map(PhaseResult::Rag),
        };
        result.map_err(|err| ClientError::InvalidBody(err.to_string()))
    }
}
