//! Script and speech service configuration.

use std::time::Duration;

use crate::error::{AiError, AiResult};

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// OpenAI-compatible completion service settings.
#[derive(Debug, Clone)]
pub struct ScriptServiceConfig {
    pub base_url: String,
    pub api_key: String,
    /// Model identifiers in priority order
    pub models: Vec<String>,
    pub request_timeout: Duration,
    pub attempts_per_model: u32,
}

impl ScriptServiceConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";
    pub const DEFAULT_MODELS: &'static str = "gpt-4o-mini,gpt-4o";

    /// Create config from environment variables.
    pub fn from_env() -> AiResult<Self> {
        let api_key = std::env::var("SCRIPT_API_KEY")
            .map_err(|_| AiError::config_error("SCRIPT_API_KEY not set"))?;
        let models = parse_models(
            &std::env::var("SCRIPT_MODELS").unwrap_or_else(|_| Self::DEFAULT_MODELS.to_string()),
        );
        if models.is_empty() {
            return Err(AiError::config_error("SCRIPT_MODELS lists no models"));
        }

        Ok(Self {
            base_url: std::env::var("SCRIPT_API_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
            api_key,
            models,
            request_timeout: Duration::from_secs(env_or("SCRIPT_REQUEST_TIMEOUT_SECS", 45)),
            attempts_per_model: env_or("SCRIPT_ATTEMPTS_PER_MODEL", 3u32).max(1),
        })
    }
}

/// Split a comma-separated model list, dropping blanks.
pub fn parse_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(String::from)
        .collect()
}

/// Speech service settings.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub bitrate: String,
    pub speed: String,
    pub pitch: String,
    pub request_timeout: Duration,
}

impl SpeechConfig {
    /// Create config from environment variables.
    pub fn from_env() -> AiResult<Self> {
        Ok(Self {
            base_url: std::env::var("TTS_API_BASE_URL")
                .map_err(|_| AiError::config_error("TTS_API_BASE_URL not set"))?,
            api_key: std::env::var("TTS_API_KEY").ok().filter(|k| !k.is_empty()),
            bitrate: std::env::var("TTS_BITRATE").unwrap_or_else(|_| "48k".to_string()),
            speed: std::env::var("TTS_SPEED").unwrap_or_else(|_| "+0%".to_string()),
            pitch: std::env::var("TTS_PITCH").unwrap_or_else(|_| "+0Hz".to_string()),
            request_timeout: Duration::from_secs(env_or("TTS_REQUEST_TIMEOUT_SECS", 60)),
        })
    }

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            bitrate: "48k".to_string(),
            speed: "+0%".to_string(),
            pitch: "+0Hz".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}
