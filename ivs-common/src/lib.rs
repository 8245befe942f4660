//! # IVS Common Library
//!
//! Shared code for the instrument valuation service and its client:
//! - Data model (InstrumentDescription, ValuationResult, RetrievedDocument)
//! - Stream event types and the step/terminal ordering rules
//! - Tolerant JSON extraction plus strict schema validation of model output
//! - SSE wire encoding/decoding
//! - Configuration file helpers

pub mod config;
pub mod error;
pub mod events;
pub mod extract;
pub mod models;
pub mod sse;

pub use error::{Error, Result};
pub use events::{Phase, PhaseResult, StreamEvent};
pub use models::{InstrumentDescription, RetrievedDocument, ValuationResult};
