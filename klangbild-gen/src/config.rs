//! Configuration for klangbild-gen
//!
//! Bootstrap settings come from a TOML file (see
//! [`klangbild_common::config::resolve_config_path`]) with built-in defaults
//! for every field. The OpenAI API key is resolved separately with priority
//! ENV → TOML → properties file.

use klangbild_common::config::{read_properties, LoggingConfig};
use klangbild_common::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "KLANGBILD_CONFIG";
/// Environment variable carrying the OpenAI API key
pub const API_KEY_ENV_VAR: &str = "KLANGBILD_OPENAI_API_KEY";
/// Key looked up in the properties file
pub const API_KEY_PROPERTY: &str = "openai.key";

/// Complete service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub logging: LoggingConfig,
    pub openai: OpenAiConfig,
    pub inference: InferenceConfig,
    pub pipeline: PipelineConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5780,
            logging: LoggingConfig::default(),
            openai: OpenAiConfig::default(),
            inference: InferenceConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

/// OpenAI API settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    /// Inline key (prefer the environment variable)
    pub api_key: Option<String>,
    /// Properties file holding `openai.key=...`
    pub api_key_file: Option<PathBuf>,
    pub vision_model: String,
    pub image_model: String,
    /// Token limit of the analysis answer
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_file: Some(PathBuf::from("secure/openAI.properties")),
            vision_model: "gpt-4-vision-preview".to_string(),
            image_model: "dall-e-3".to_string(),
            max_tokens: 300,
            request_timeout_secs: 120,
        }
    }
}

/// Inference sidecar settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub base_url: String,
    /// Diffusion and music generation are slow; keep this generous
    pub request_timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7860".to_string(),
            request_timeout_secs: 900,
        }
    }
}

/// Pipeline and HTTP limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pass through IDLING between analysis and generation
    pub emit_handoff_marker: bool,
    /// Upper bound of concurrently generating audio tasks
    pub max_concurrent_audio_tasks: usize,
    /// Request body limit for image uploads
    pub max_upload_bytes: usize,
    /// Event bus capacity
    pub event_capacity: usize,
    /// Timeout for downloading remotely generated images
    pub download_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            emit_handoff_marker: true,
            max_concurrent_audio_tasks: 2,
            max_upload_bytes: 20 * 1024 * 1024,
            event_capacity: 100,
            download_timeout_secs: 60,
        }
    }
}

/// Resolve the OpenAI API key
///
/// **Priority:** ENV → TOML `api_key` → properties file
pub fn resolve_openai_api_key(config: &OpenAiConfig) -> Result<String> {
    let mut sources = Vec::new();

    let env_key = std::env::var(API_KEY_ENV_VAR).ok().filter(|k| is_valid_key(k));
    if env_key.is_some() {
        sources.push("environment");
    }

    let toml_key = config.api_key.clone().filter(|k| is_valid_key(k));
    if toml_key.is_some() {
        sources.push("TOML");
    }

    let file_key = config
        .api_key_file
        .as_ref()
        .filter(|path| path.exists())
        .and_then(|path| match read_properties(path) {
            Ok(props) => props.get(API_KEY_PROPERTY).cloned(),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .filter(|k| is_valid_key(k));
    if file_key.is_some() {
        sources.push("properties file");
    }

    if sources.len() > 1 {
        warn!(
            "OpenAI API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = env_key.or(toml_key).or(file_key) {
        info!("OpenAI API key loaded from {}", sources[0]);
        return Ok(key);
    }

    Err(Error::Config(format!(
        "OpenAI API key not configured. Please configure using one of:\n\
         1. Environment: {}=your-key-here\n\
         2. TOML config: [openai] api_key = \"your-key\"\n\
         3. Properties file: {}=your-key-here (path set by [openai] api_key_file)",
        API_KEY_ENV_VAR, API_KEY_PROPERTY
    )))
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
