//! Service configuration
//!
//! Every setting resolves CLI → environment → TOML file → default. The TOML
//! file is `--config <path>` or `<config_dir>/ivs/ivs-api.toml`:
//!
//! ```toml
//! [server]
//! port = 8000
//! cors_origins = ["http://localhost:5173"]
//!
//! [openai]
//! vlm_model = "gpt-4o-mini"
//! reasoning_effort = "low"
//!
//! [rag]
//! top_k = 4
//! seed_path = "data/seed.jsonl"
//! ```

use ivs_common::config::{env_override, load_toml, resolve};
use ivs_common::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MODULE_NAME: &str = "ivs-api";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_VLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_RAG_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_REASONING_SUMMARY: &str = "auto";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

pub const DEFAULT_TOP_K: usize = 4;
pub const DEFAULT_SEED_PATH: &str = "data/seed.jsonl";
pub const DEFAULT_CONTEXT_MAX_CHARS: usize = 6000;

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Raw TOML layout; every key optional
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerSection,
    pub openai: OpenAiSection,
    pub rag: RagSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub cors_origins: Option<Vec<String>>,
    pub max_upload_bytes: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiSection {
    pub api_key: Option<String>,
    pub api_base: Option<String>,
    pub vlm_model: Option<String>,
    pub rag_model: Option<String>,
    pub embed_model: Option<String>,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub text_verbosity: Option<String>,
    pub json_mode: Option<bool>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RagSection {
    pub top_k: Option<usize>,
    pub seed_path: Option<PathBuf>,
    pub context_max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: Option<String>,
}

/// Command-line values; `None` defers to lower tiers
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    pub config: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub seed_path: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Browser origins allowed by CORS
    pub cors_origins: Vec<String>,
    /// Upload size limit for `image` fields
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: vec![DEFAULT_CORS_ORIGIN.to_string()],
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// OpenAI settings; request option strings are validated by
/// [`crate::model::options::RequestOptions::from_config`].
#[derive(Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub api_base: String,
    pub vlm_model: String,
    pub rag_model: String,
    pub embed_model: String,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub text_verbosity: Option<String>,
    pub json_mode: bool,
    pub timeout_secs: u64,
}

// Hand-written so the API key never lands in logs
impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("vlm_model", &self.vlm_model)
            .field("rag_model", &self.rag_model)
            .field("embed_model", &self.embed_model)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("reasoning_summary", &self.reasoning_summary)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .field("text_verbosity", &self.text_verbosity)
            .field("json_mode", &self.json_mode)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    pub top_k: usize,
    pub seed_path: PathBuf,
    /// Character budget for the assembled reference context
    pub context_max_chars: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            seed_path: PathBuf::from(DEFAULT_SEED_PATH),
            context_max_chars: DEFAULT_CONTEXT_MAX_CHARS,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub openai: OpenAiConfig,
    pub rag: RagConfig,
    pub log_level: String,
}

impl ServiceConfig {
    /// Resolve every setting; a missing API key is an error
    pub fn resolve(cli: &CliOverrides) -> Result<Self> {
        let file: FileConfig = load_toml(cli.config.as_deref(), MODULE_NAME)?;
        Self::from_sources(cli, file)
    }

    /// Resolve against an already-parsed file
    pub fn from_sources(cli: &CliOverrides, file: FileConfig) -> Result<Self> {
        let FileConfig {
            server,
            openai,
            rag,
            logging,
        } = file;

        let cors_origins = match env_override::<String>("IVS_CORS_ORIGINS")? {
            Some(raw) => split_list(&raw),
            None => server
                .cors_origins
                .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()]),
        };

        let server = ServerConfig {
            host: resolve(
                cli.host.clone(),
                "IVS_HOST",
                server.host,
                DEFAULT_HOST.to_string(),
            )?,
            port: resolve(cli.port, "IVS_PORT", server.port, DEFAULT_PORT)?,
            cors_origins,
            max_upload_bytes: resolve(
                None,
                "IVS_MAX_UPLOAD_BYTES",
                server.max_upload_bytes,
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
        };

        let api_key = optional("OPENAI_API_KEY", openai.api_key)?
            .ok_or_else(|| Error::Config("OPENAI_API_KEY is not set".to_string()))?;

        let openai = OpenAiConfig {
            api_key,
            api_base: resolve(
                None,
                "OPENAI_API_BASE",
                openai.api_base,
                DEFAULT_API_BASE.to_string(),
            )?,
            vlm_model: resolve(
                None,
                "OPENAI_VLM_MODEL",
                openai.vlm_model,
                DEFAULT_VLM_MODEL.to_string(),
            )?,
            rag_model: resolve(
                None,
                "OPENAI_RAG_MODEL",
                openai.rag_model,
                DEFAULT_RAG_MODEL.to_string(),
            )?,
            embed_model: resolve(
                None,
                "OPENAI_EMBED_MODEL",
                openai.embed_model,
                DEFAULT_EMBED_MODEL.to_string(),
            )?,
            reasoning_effort: optional("OPENAI_REASONING_EFFORT", openai.reasoning_effort)?,
            reasoning_summary: optional("OPENAI_REASONING_SUMMARY", openai.reasoning_summary)?
                .or_else(|| Some(DEFAULT_REASONING_SUMMARY.to_string())),
            max_output_tokens: optional("OPENAI_MAX_OUTPUT_TOKENS", openai.max_output_tokens)?,
            temperature: optional("OPENAI_TEMPERATURE", openai.temperature)?,
            text_verbosity: optional("OPENAI_TEXT_VERBOSITY", openai.text_verbosity)?,
            json_mode: resolve(None, "OPENAI_JSON_MODE", openai.json_mode, true)?,
            timeout_secs: resolve(
                None,
                "OPENAI_TIMEOUT_SECS",
                openai.timeout_secs,
                DEFAULT_TIMEOUT_SECS,
            )?,
        };

        let rag = RagConfig {
            top_k: resolve(None, "RAG_TOP_K", rag.top_k, DEFAULT_TOP_K)?,
            seed_path: resolve(
                cli.seed_path.clone(),
                "RAG_SEED_PATH",
                rag.seed_path,
                PathBuf::from(DEFAULT_SEED_PATH),
            )?,
            context_max_chars: resolve(
                None,
                "RAG_CONTEXT_MAX_CHARS",
                rag.context_max_chars,
                DEFAULT_CONTEXT_MAX_CHARS,
            )?,
        };

        let log_level = resolve(
            cli.log_level.clone(),
            "IVS_LOG_LEVEL",
            logging.level,
            DEFAULT_LOG_LEVEL.to_string(),
        )?;

        Ok(Self {
            server,
            openai,
            rag,
            log_level,
        })
    }

    /// `host:port` for the listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn seed_path(&self) -> &Path {
        &self.rag.seed_path
    }
}

/// Environment value if set, else the file value
fn optional<T>(env_name: &str, file: Option<T>) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(env_override(env_name)?.or(file))
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_list_trims_and_skips_blanks() {
        assert_eq!(
            split_list(" http://a:1, ,http://b:2 "),
            vec!["http://a:1".to_string(), "http://b:2".to_string()]
        );
    }

    #[test]
    fn test_file_layout_parses() {
        let file: FileConfig = toml::from_str(
            r#"
            [server]
            port = 9100
            cors_origins = ["http://example.test"]

            [openai]
            api_key = "sk-test"
            json_mode = false

            [rag]
            top_k = 2
            "#,
        )
        .unwrap();
        assert_eq!(file.server.port, Some(9100));
        assert_eq!(file.openai.json_mode, Some(false));
        assert_eq!(file.rag.top_k, Some(2));
        assert!(file.logging.level.is_none());
    }

    #[test]
    fn test_debug_output_redacts_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-secret".into(),
            api_base: DEFAULT_API_BASE.into(),
            vlm_model: DEFAULT_VLM_MODEL.into(),
            rag_model: DEFAULT_RAG_MODEL.into(),
            embed_model: DEFAULT_EMBED_MODEL.into(),
            reasoning_effort: None,
            reasoning_summary: None,
            max_output_tokens: None,
            temperature: None,
            text_verbosity: None,
            json_mode: true,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
