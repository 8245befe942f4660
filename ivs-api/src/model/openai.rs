//! OpenAI HTTP client
//!
//! Generation goes through the Responses API (`POST {base}/responses`);
//! embeddings through `POST {base}/embeddings`. One client serves as the
//! vision model, the reasoning model and the embedder, each with its own
//! configured model name.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::options::RequestOptions;
use super::prompts::{valuation_input, DESCRIPTION_PROMPT, VALUATION_PROMPT};
use super::{Embedder, ModelError, ModelReply, ReasoningModel, TokenUsage, VisionModel};
use crate::config::OpenAiConfig;

const USER_AGENT: &str = concat!("ivs-api/", env!("CARGO_PKG_VERSION"));

/// Inputs per embeddings request
const EMBED_BATCH_SIZE: usize = 64;

pub struct OpenAiClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    vlm_model: String,
    rag_model: String,
    embed_model: String,
    options: RequestOptions,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, ModelError> {
        if config.api_key.trim().is_empty() {
            return Err(ModelError::Config("OPENAI_API_KEY is not set".to_string()));
        }
        let options = RequestOptions::from_config(config)?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            vlm_model: config.vlm_model.clone(),
            rag_model: config.rag_model.clone(),
            embed_model: config.embed_model.clone(),
            options,
        })
    }

    /// Request body for a single-turn Responses call
    fn responses_body(&self, model: &str, content: Vec<Value>) -> Value {
        let mut body = Map::new();
        body.insert("model".into(), Value::from(model));
        body.insert(
            "input".into(),
            json!([{ "role": "user", "content": content }]),
        );
        self.options.apply(model, true, &mut body);
        Value::Object(body)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ModelError> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            warn!(%url, status = status.as_u16(), "OpenAI request rejected");
            return Err(ModelError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))
    }

    async fn create_response(&self, model: &str, content: Vec<Value>) -> Result<ModelReply, ModelError> {
        let body = self.responses_body(model, content);
        debug!(model, "Sending Responses API request");
        let value = self.post_json("responses", &body).await?;
        parse_response(&value)
    }
}

#[async_trait]
impl VisionModel for OpenAiClient {
    async fn describe_image(&self, image_data_url: &str) -> Result<ModelReply, ModelError> {
        let content = vec![
            json!({ "type": "input_text", "text": DESCRIPTION_PROMPT }),
            json!({ "type": "input_image", "image_url": image_data_url, "detail": "auto" }),
        ];
        self.create_response(&self.vlm_model, content).await
    }
}

#[async_trait]
impl ReasoningModel for OpenAiClient {
    async fn estimate(&self, target: &str, references: &str) -> Result<ModelReply, ModelError> {
        let content = vec![
            json!({ "type": "input_text", "text": VALUATION_PROMPT }),
            json!({ "type": "input_text", "text": valuation_input(target, references) }),
        ];
        self.create_response(&self.rag_model, content).await
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            let body = json!({ "model": self.embed_model, "input": batch });
            let value = self.post_json("embeddings", &body).await?;
            let mut parsed = parse_embeddings(&value)?;
            if parsed.len() != batch.len() {
                return Err(ModelError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    parsed.len()
                )));
            }
            vectors.append(&mut parsed);
        }
        Ok(vectors)
    }
}

/// Pull text, reasoning summary and usage out of a Responses API body
pub fn parse_response(value: &Value) -> Result<ModelReply, ModelError> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(ModelError::InvalidResponse(error.to_string()));
    }

    let output = value
        .get("output")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let mut text = String::new();
    let mut reasoning = Vec::new();
    for item in output {
        match item.get("type").and_then(Value::as_str) {
            Some("message") => {
                let parts = item.get("content").and_then(Value::as_array);
                for part in parts.into_iter().flatten() {
                    if part.get("type").and_then(Value::as_str) == Some("output_text") {
                        if let Some(fragment) = part.get("text").and_then(Value::as_str) {
                            text.push_str(fragment);
                        }
                    }
                }
            }
            Some("reasoning") => {
                let summaries = item.get("summary").and_then(Value::as_array);
                for summary in summaries.into_iter().flatten() {
                    let Some(summary_text) = summary.get("text").and_then(Value::as_str) else {
                        continue;
                    };
                    reasoning.extend(
                        summary_text
                            .lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(str::to_string),
                    );
                }
            }
            _ => {}
        }
    }

    // Some gateways flatten the reply into a top-level `output_text`
    if text.is_empty() {
        if let Some(flat) = value.get("output_text").and_then(Value::as_str) {
            text.push_str(flat);
        }
    }

    Ok(ModelReply {
        text,
        reasoning,
        usage: parse_usage(value),
    })
}

fn parse_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value.get("usage").filter(|u| u.is_object())?;
    let field = |name: &str| usage.get(name).and_then(Value::as_i64).unwrap_or(0);
    Some(TokenUsage {
        input_tokens: field("input_tokens"),
        output_tokens: field("output_tokens"),
        total_tokens: field("total_tokens"),
    })
}

fn parse_embeddings(value: &Value) -> Result<Vec<Vec<f32>>, ModelError> {
    let data = value
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ModelError::InvalidResponse("embeddings response has no data".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize)
            .unwrap_or(position);
        let vector = item
            .get("embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| ModelError::InvalidResponse("embedding missing".into()))?
            .iter()
            .map(|x| x.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<f32>>>()
            .ok_or_else(|| ModelError::InvalidResponse("non-numeric embedding".into()))?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
