//! Stream event types for the IVS event protocol
//!
//! Both pipelines report progress as a sequence of [`StreamEvent`]s pushed
//! over SSE. The event name on the wire is the variant (`step`, `log`,
//! `result`, `error`); the `data:` payload is the variant's JSON body.

pub mod log_codes;
mod sequence;

pub use sequence::{check_sequence, SequenceTracker, SequenceViolation};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{InstrumentDescription, ValuationResult};

/// Number of steps in each phase (indices `0..STEP_COUNT`)
pub const STEP_COUNT: usize = 4;

/// The two staged operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Photo → InstrumentDescription
    Vision,
    /// InstrumentDescription → ValuationResult
    Rag,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Vision => "vision",
            Phase::Rag => "rag",
        }
    }

    /// Human-readable label for each step index of this phase
    pub fn step_labels(&self) -> [&'static str; STEP_COUNT] {
        match self {
            Phase::Vision => [
                "input preparation",
                "image normalization",
                "visual inference",
                "structured extraction",
            ],
            Phase::Rag => [
                "query construction",
                "retrieval",
                "context assembly",
                "valuation inference",
            ],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step boundary marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Done,
}

/// `step` event body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepEvent {
    pub phase: Phase,
    pub index: u8,
    pub status: StepStatus,
}

/// A log metadata value: a number or a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Integer(v)
    }
}

impl From<usize> for MetaValue {
    fn from(v: usize) -> Self {
        MetaValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Text(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Text(v)
    }
}

/// Ordered metadata attached to a log event
pub type LogMeta = BTreeMap<String, MetaValue>;

/// `log` event body: fine-grained narration independent of step indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<LogMeta>,
}

/// `result` event body: `{phase, payload}`, the payload type following the phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "payload", rename_all = "lowercase")]
pub enum PhaseResult {
    Vision(InstrumentDescription),
    Rag(ValuationResult),
}

impl PhaseResult {
    pub fn phase(&self) -> Phase {
        match self {
            PhaseResult::Vision(_) => Phase::Vision,
            PhaseResult::Rag(_) => Phase::Rag,
        }
    }
}

/// `error` event body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
}

/// One event of a phase stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Step(StepEvent),
    Log(LogEvent),
    Result(PhaseResult),
    Error(ErrorEvent),
}

/// An SSE frame could not be turned into a [`StreamEvent`]
#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Invalid {event} payload: {source}")]
    Payload {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamEvent {
    pub fn step(phase: Phase, index: u8, status: StepStatus) -> Self {
        StreamEvent::Step(StepEvent {
            phase,
            index,
            status,
        })
    }

    pub fn log(code: impl Into<String>) -> Self {
        StreamEvent::Log(LogEvent {
            code: code.into(),
            meta: None,
        })
    }

    pub fn log_with(code: impl Into<String>, meta: LogMeta) -> Self {
        StreamEvent::Log(LogEvent {
            code: code.into(),
            meta: Some(meta),
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        StreamEvent::Error(ErrorEvent {
            message: message.into(),
        })
    }

    /// Event name used on the `event:` line
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Step(_) => "step",
            StreamEvent::Log(_) => "log",
            StreamEvent::Result(_) => "result",
            StreamEvent::Error(_) => "error",
        }
    }

    /// `result` and `error` end a stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Result(_) | StreamEvent::Error(_))
    }

    /// JSON body carried on the `data:` line(s)
    pub fn data_json(&self) -> serde_json::Result<String> {
        match self {
            StreamEvent::Step(body) => serde_json::to_string(body),
            StreamEvent::Log(body) => serde_json::to_string(body),
            StreamEvent::Result(body) => serde_json::to_string(body),
            StreamEvent::Error(body) => serde_json::to_string(body),
        }
    }

    /// Rebuild an event from its SSE name and data
    pub fn from_parts(event_type: &str, data: &str) -> Result<Self, EventDecodeError> {
        fn payload<T: serde::de::DeserializeOwned>(
            event: &'static str,
            data: &str,
        ) -> Result<T, EventDecodeError> {
            serde_json::from_str(data).map_err(|source| EventDecodeError::Payload { event, source })
        }

        match event_type {
            "step" => Ok(StreamEvent::Step(payload("step", data)?)),
            "log" => Ok(StreamEvent::Log(payload("log", data)?)),
            "result" => Ok(StreamEvent::Result(payload("result", data)?)),
            "error" => Ok(StreamEvent::Error(payload("error", data)?)),
            other => Err(EventDecodeError::UnknownType(other.to_string())),
        }
    }
}
