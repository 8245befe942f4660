//! Client error types

use ivs_common::events::EventDecodeError;
use ivs_common::Phase;
use thiserror::Error;

use crate::state::Generation;

/// Errors raised while talking to the valuation service or while
/// reconciling its events with the session state
#[derive(Debug, Error)]
pub enum ClientError {
    /// The event stream could not be opened or broke mid-way
    #[error("Stream transport error: {0}")]
    StreamTransport(String),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status; `message` is the service's plain-text body
    #[error("{message}")]
    Server { status: u16, message: String },

    #[error("Invalid event: {0}")]
    Decode(#[from] EventDecodeError),

    #[error("Invalid response body: {0}")]
    InvalidBody(String),

    /// Stream closed after some events but before a terminal one
    #[error("Stream ended without a result")]
    Incomplete,

    /// Output of a superseded operation; never shown to the user
    #[error("Discarded {phase} output from superseded generation {generation}")]
    StaleResponseDiscarded { phase: Phase, generation: Generation },

    #[error("No description available to estimate")]
    NoDescription,
}

impl ClientError {
    pub fn is_stale(&self) -> bool {
        matches!(self, ClientError::StaleResponseDiscarded { .. })
    }
}
