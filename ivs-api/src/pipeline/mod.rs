//! Staged inference pipelines and their event sink
//!
//! A pipeline run is a strictly sequential chain of awaited steps. Progress is
//! pushed into an [`EventSink`]; the HTTP layer drains the sink's receiver
//! into an SSE response. The same run code serves the synchronous endpoints
//! with a detached sink that discards events.
//!
//! Event ordering per run: `step(i, start)`, any logs for step `i`,
//! `step(i, done)`, then step `i + 1`. A run ends with exactly one terminal
//! event, emitted by [`EventSink::conclude`], which consumes the sink.

pub mod description;
pub mod valuation;

pub use description::{DescriptionPipeline, ImageUpload};
pub use valuation::{build_context, build_query, ValuationPipeline};

use ivs_common::events::{LogMeta, MetaValue, Phase, PhaseResult, StepStatus, StreamEvent};
use ivs_common::extract::{ExtractionError, OutputError, SchemaValidationError};
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::model::{ModelError, ModelReply};
use crate::retrieval::RetrievalError;

/// Event channel capacity; one slot keeps the pipeline in lockstep with the
/// transport.
pub const EVENT_CHANNEL_CAPACITY: usize = 1;

/// Why a pipeline run stopped short of a result
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    SchemaValidation(#[from] SchemaValidationError),

    #[error("{0}")]
    Config(String),

    #[error("Upstream model error: {0}")]
    UpstreamModel(ModelError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    /// The event consumer went away; nothing more can be delivered
    #[error("Event stream closed by client")]
    Disconnected,
}

impl From<OutputError> for PipelineError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::Extraction(e) => PipelineError::Extraction(e),
            OutputError::Schema(e) => PipelineError::SchemaValidation(e),
        }
    }
}

impl From<ModelError> for PipelineError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Config(message) => PipelineError::Config(message),
            other => PipelineError::UpstreamModel(other),
        }
    }
}

impl PipelineError {
    /// Errors caused by the request or its model output rather than by a
    /// collaborator outage
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidInput(_)
                | PipelineError::Extraction(_)
                | PipelineError::SchemaValidation(_)
                | PipelineError::Config(_)
        )
    }

    /// Message carried by the terminal `error` event. Collaborator failures
    /// are reported generically; their detail stays in the server log.
    pub fn terminal_message(&self, phase: Phase) -> String {
        if self.is_client_error() {
            return self.to_string();
        }
        match phase {
            Phase::Vision => "VLM request failed".to_string(),
            Phase::Rag => "RAG request failed".to_string(),
        }
    }
}

/// Ordered event output of one pipeline run
///
/// `step`/`log` sends wait for channel capacity and fail with
/// [`PipelineError::Disconnected`] once the receiver is dropped, so a run
/// stops at its next emission after the client goes away.
pub struct EventSink {
    phase: Phase,
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl EventSink {
    /// Sink feeding a fresh receiver
    pub fn channel(phase: Phase) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        (Self { phase, tx: Some(tx) }, rx)
    }

    /// Sink that discards every event (synchronous endpoints)
    pub fn detached(phase: Phase) -> Self {
        Self { phase, tx: None }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    async fn send(&self, event: StreamEvent) -> Result<(), PipelineError> {
        match &self.tx {
            Some(tx) => tx
                .send(event)
                .await
                .map_err(|_| PipelineError::Disconnected),
            None => Ok(()),
        }
    }

    pub async fn start(&self, index: u8) -> Result<(), PipelineError> {
        debug!(phase = %self.phase, index, "Step started");
        self.send(StreamEvent::step(self.phase, index, StepStatus::Start))
            .await
    }

    pub async fn done(&self, index: u8) -> Result<(), PipelineError> {
        debug!(phase = %self.phase, index, "Step done");
        self.send(StreamEvent::step(self.phase, index, StepStatus::Done))
            .await
    }

    pub async fn log(&self, code: &str) -> Result<(), PipelineError> {
        self.send(StreamEvent::log(code)).await
    }

    pub async fn log_with(&self, code: &str, meta: LogMeta) -> Result<(), PipelineError> {
        self.send(StreamEvent::log_with(code, meta)).await
    }

    /// Narrate a model reply: one log per reasoning line, then usage
    pub async fn report_reply(
        &self,
        reasoning_code: &str,
        usage_code: &str,
        reply: &ModelReply,
    ) -> Result<(), PipelineError> {
        for line in &reply.reasoning {
            self.log_with(reasoning_code, meta([("text", MetaValue::from(line.as_str()))]))
                .await?;
        }
        if let Some(usage) = reply.usage {
            self.log_with(
                usage_code,
                meta([
                    ("input_tokens", MetaValue::from(usage.input_tokens)),
                    ("output_tokens", MetaValue::from(usage.output_tokens)),
                    ("total_tokens", MetaValue::from(usage.total_tokens)),
                ]),
            )
            .await?;
        }
        Ok(())
    }

    /// Await `work`, abandoning it if the consumer disconnects first.
    /// Dropping the future is the only cancellation available for an
    /// already-dispatched HTTP call.
    pub async fn guard<F>(&self, work: F) -> Result<F::Output, PipelineError>
    where
        F: Future,
    {
        let Some(tx) = &self.tx else {
            return Ok(work.await);
        };
        tokio::select! {
            output = work => Ok(output),
            _ = tx.closed() => {
                info!(phase = %self.phase, "Client disconnected during model call");
                Err(PipelineError::Disconnected)
            }
        }
    }

    /// Emit the single terminal event for `outcome`
    pub async fn conclude(self, outcome: &Result<PhaseResult, PipelineError>) {
        let event = match outcome {
            Ok(result) => StreamEvent::Result(result.clone()),
            Err(PipelineError::Disconnected) => return,
            Err(err) => StreamEvent::error(err.terminal_message(self.phase)),
        };
        if self.send(event).await.is_err() {
            warn!(phase = %self.phase, "Client gone before terminal event");
        }
    }
}

/// Build log metadata from key/value pairs
pub fn meta<const N: usize>(pairs: [(&str, MetaValue); N]) -> LogMeta {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
