//! Per-request generation options for the Responses API
//!
//! Option strings come from config and may carry an inline `# comment`
//! (common in `.env` files); the comment is stripped and the value
//! case-folded before validation. Validation happens once at startup.

use serde_json::{json, Map, Value};
use std::str::FromStr;

use crate::config::OpenAiConfig;
use crate::model::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningEffort {
    None,
    Minimal,
    Low,
    Medium,
    High,
    XHigh,
}

impl ReasoningEffort {
    pub const ALLOWED: &'static str = "high, low, medium, minimal, none, xhigh";

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningEffort::None => "none",
            ReasoningEffort::Minimal => "minimal",
            ReasoningEffort::Low => "low",
            ReasoningEffort::Medium => "medium",
            ReasoningEffort::High => "high",
            ReasoningEffort::XHigh => "xhigh",
        }
    }
}

impl FromStr for ReasoningEffort {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "none" => Ok(ReasoningEffort::None),
            "minimal" => Ok(ReasoningEffort::Minimal),
            "low" => Ok(ReasoningEffort::Low),
            "medium" => Ok(ReasoningEffort::Medium),
            "high" => Ok(ReasoningEffort::High),
            "xhigh" => Ok(ReasoningEffort::XHigh),
            _ => Err(invalid("OPENAI_REASONING_EFFORT", Self::ALLOWED)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasoningSummary {
    Auto,
    Concise,
    Detailed,
}

impl ReasoningSummary {
    pub const ALLOWED: &'static str = "auto, concise, detailed";

    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningSummary::Auto => "auto",
            ReasoningSummary::Concise => "concise",
            ReasoningSummary::Detailed => "detailed",
        }
    }
}

impl FromStr for ReasoningSummary {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "auto" => Ok(ReasoningSummary::Auto),
            "concise" => Ok(ReasoningSummary::Concise),
            "detailed" => Ok(ReasoningSummary::Detailed),
            _ => Err(invalid("OPENAI_REASONING_SUMMARY", Self::ALLOWED)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextVerbosity {
    Low,
    Medium,
    High,
}

impl TextVerbosity {
    pub const ALLOWED: &'static str = "high, low, medium";

    pub fn as_str(&self) -> &'static str {
        match self {
            TextVerbosity::Low => "low",
            TextVerbosity::Medium => "medium",
            TextVerbosity::High => "high",
        }
    }
}

impl FromStr for TextVerbosity {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(TextVerbosity::Low),
            "medium" => Ok(TextVerbosity::Medium),
            "high" => Ok(TextVerbosity::High),
            _ => Err(invalid("OPENAI_TEXT_VERBOSITY", Self::ALLOWED)),
        }
    }
}

fn invalid(name: &str, allowed: &str) -> ModelError {
    ModelError::Config(format!("{name} must be one of {allowed}"))
}

/// Drop an inline `# comment`, trim and case-fold
fn normalize(raw: &str) -> String {
    raw.split('#').next().unwrap_or("").trim().to_lowercase()
}

/// Parse an optional option string; blank (after comment stripping) is unset
fn parse_optional<T>(raw: Option<&str>) -> Result<Option<T>, ModelError>
where
    T: FromStr<Err = ModelError>,
{
    match raw {
        Some(value) if !normalize(value).is_empty() => value.parse().map(Some),
        _ => Ok(None),
    }
}

/// Reasoning models accept `reasoning{}` but reject `temperature`
pub fn supports_reasoning(model: &str) -> bool {
    let model = model.trim().to_lowercase();
    model.starts_with("gpt-5") || model.starts_with('o')
}

/// Validated generation options shared by every Responses API call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub reasoning_summary: Option<ReasoningSummary>,
    pub text_verbosity: Option<TextVerbosity>,
    pub json_mode: bool,
}

impl RequestOptions {
    pub fn from_config(config: &OpenAiConfig) -> Result<Self, ModelError> {
        Ok(Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
            reasoning_effort: parse_optional(config.reasoning_effort.as_deref())?,
            reasoning_summary: parse_optional(config.reasoning_summary.as_deref())?,
            text_verbosity: parse_optional(config.text_verbosity.as_deref())?,
            json_mode: config.json_mode,
        })
    }

    /// Add the options that apply to `model` to a request body.
    /// `force_json` requests a JSON object response when JSON mode is on.
    pub fn apply(&self, model: &str, force_json: bool, body: &mut Map<String, Value>) {
        if let Some(limit) = self.max_output_tokens {
            body.insert("max_output_tokens".into(), Value::from(limit));
        }

        let reasoning_model = supports_reasoning(model);
        if let Some(temperature) = self.temperature.filter(|_| !reasoning_model) {
            body.insert("temperature".into(), Value::from(temperature));
        }

        if reasoning_model {
            let mut reasoning = Map::new();
            if let Some(effort) = self.reasoning_effort {
                reasoning.insert("effort".into(), Value::from(effort.as_str()));
            }
            if let Some(summary) = self.reasoning_summary {
                reasoning.insert("summary".into(), Value::from(summary.as_str()));
            }
            if !reasoning.is_empty() {
                body.insert("reasoning".into(), Value::Object(reasoning));
            }
        }

        let mut text = Map::new();
        if let Some(verbosity) = self.text_verbosity {
            text.insert("verbosity".into(), Value::from(verbosity.as_str()));
        }
        if force_json && self.json_mode {
            text.insert("format".into(), json!({ "type": "json_object" }));
        }
        if !text.is_empty() {
            body.insert("text".into(), Value::Object(text));
        }
    }
}
