//! Model collaborators
//!
//! The pipelines talk to three external capabilities through traits so that
//! tests can substitute in-process fakes:
//! - [`VisionModel`]: image + instruction → free text
//! - [`ReasoningModel`]: target description + reference context → free text
//! - [`Embedder`]: texts → vectors (used by the in-memory retrieval store)
//!
//! [`openai::OpenAiClient`] implements all three against the OpenAI HTTP API.

pub mod openai;
pub mod options;
pub mod prompts;

use async_trait::async_trait;
use thiserror::Error;

/// Token accounting reported by the model provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

/// Free-text reply from a generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    /// Concatenated output text
    pub text: String,
    /// Reasoning summary, one entry per non-blank line
    pub reasoning: Vec<String>,
    pub usage: Option<TokenUsage>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }
}

/// Collaborator call failure
#[derive(Debug, Error)]
pub enum ModelError {
    /// Local misconfiguration (missing key, invalid option)
    #[error("Model configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Describe the instrument in the image given as a `data:` URL
    async fn describe_image(&self, image_data_url: &str) -> Result<ModelReply, ModelError>;
}

#[async_trait]
pub trait ReasoningModel: Send + Sync {
    /// Estimate a price for `target` given the assembled `references`
    async fn estimate(&self, target: &str, references: &str) -> Result<ModelReply, ModelError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;
}
