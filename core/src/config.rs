//! Configuration for the Q-Gen core.

use std::path::Path;
use std::time::Duration;

use crate::error::{QgenError, Result};

/// Default model identifier used when `QGEN_MODEL_NAME` is unset.
pub const DEFAULT_MODEL_NAME: &str = "gemini-2.5-flash-lite";

/// Default Google Generative Language API endpoint.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_GENERATION_PROMPT: &str = include_str!("prompts/generation.txt");
const DEFAULT_SCAN_PROMPT: &str = include_str!("prompts/scan.txt");

/// Literal tags the model is instructed to wrap its two artifacts in.
///
/// These are prompt-engineering constants in the prompt templates; keep them
/// in sync when overriding either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markers {
    pub code_start: String,
    pub code_end: String,
    pub json_start: String,
    pub json_end: String
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            code_start: "[C++ START]".to_string(),
            code_end: "[C++ END]".to_string(),
            json_start: "[JSON START]".to_string(),
            json_end: "[JSON END]".to_string()
        }
    }
}

/// Retry schedule for the orchestrator.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempt budget per call.
    pub max_attempts: u32,
    /// Base delay for server-side (5xx) failures; grows linearly with the
    /// attempt number.
    pub transient_backoff: Duration,
    /// Base delay for unclassified failures; smaller linear growth.
    pub unknown_backoff: Duration,
    /// Fixed delay after a non-quota safety block.
    pub blocked_delay: Duration,
    /// Treat every safety block as rotation-worthy instead of only blocks
    /// whose reason text carries a quota indicator.
    pub rotate_on_any_block: bool
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            transient_backoff: Duration::from_secs(1),
            unknown_backoff: Duration::from_millis(500),
            blocked_delay: Duration::from_secs(1),
            rotate_on_any_block: false
        }
    }
}

/// Top-level configuration for the core.
#[derive(Debug, Clone)]
pub struct QgenConfig {
    /// Model identifier passed to the remote API.
    pub model_name: String,
    /// API base URL; overridable for tests.
    pub api_base_url: String,
    /// Ordered API key pool. Must be non-empty.
    pub keys: Vec<String>,
    /// System prompt for generation mode.
    pub generation_prompt: String,
    /// System prompt for scan mode.
    pub scan_prompt: String,
    pub markers: Markers,
    pub retry: RetryPolicy
}

impl QgenConfig {
    /// Loads configuration from environment variables.
    ///
    /// Keys come from `GEMINI_API_KEY_1` through `GEMINI_API_KEY_9` in
    /// order, falling back to a single `GEMINI_API_KEY`. An empty pool is a
    /// fatal configuration error.
    pub fn from_env() -> Result<Self> {
        let keys = load_key_pool_from_env()?;

        let generation_prompt = match std::env::var("QGEN_PROMPT_FILE") {
            Ok(path) => load_prompt_file(Path::new(&path))?,
            Err(_) => DEFAULT_GENERATION_PROMPT.to_string()
        };
        let scan_prompt = match std::env::var("QGEN_SCAN_PROMPT_FILE") {
            Ok(path) => load_prompt_file(Path::new(&path))?,
            Err(_) => DEFAULT_SCAN_PROMPT.to_string()
        };

        Ok(Self {
            model_name: std::env::var("QGEN_MODEL_NAME")
                .unwrap_or_else(|_| DEFAULT_MODEL_NAME.to_string()),
            api_base_url: std::env::var("QGEN_API_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string()),
            keys,
            generation_prompt,
            scan_prompt,
            markers: Markers::default(),
            retry: RetryPolicy::default()
        })
    }

    /// Creates a builder for configuration.
    #[must_use]
    pub fn builder() -> QgenConfigBuilder {
        QgenConfigBuilder::default()
    }
}

fn load_key_pool_from_env() -> Result<Vec<String>> {
    let mut keys = Vec::new();
    for i in 1..=9 {
        if let Ok(key) = std::env::var(format!("GEMINI_API_KEY_{i}")) {
            if !key.is_empty() {
                keys.push(key);
            }
        }
    }
    if keys.is_empty() {
        if let Ok(key) = std::env::var("GEMINI_API_KEY") {
            if !key.is_empty() {
                keys.push(key);
            }
        }
    }
    if keys.is_empty() {
        return Err(QgenError::configuration(
            "no API keys found: set GEMINI_API_KEY_1..9 or GEMINI_API_KEY"
        ));
    }
    Ok(keys)
}

fn load_prompt_file(path: &Path) -> Result<String> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        QgenError::configuration(format!("cannot read prompt file {}: {e}", path.display()))
    })?;
    if content.trim().is_empty() {
        return Err(QgenError::configuration(format!(
            "prompt file {} is empty",
            path.display()
        )));
    }
    Ok(content)
}

/// Builder for `QgenConfig`.
#[derive(Default)]
pub struct QgenConfigBuilder {
    model_name: Option<String>,
    api_base_url: Option<String>,
    keys: Vec<String>,
    generation_prompt: Option<String>,
    scan_prompt: Option<String>,
    markers: Option<Markers>,
    retry: Option<RetryPolicy>
}

impl QgenConfigBuilder {
    /// Sets the model identifier.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Sets the API base URL.
    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Adds one API key to the pool.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// Replaces the whole key pool.
    #[must_use]
    pub fn keys(mut self, keys: Vec<String>) -> Self {
        self.keys = keys;
        self
    }

    /// Sets the generation-mode system prompt.
    #[must_use]
    pub fn generation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.generation_prompt = Some(prompt.into());
        self
    }

    /// Sets the scan-mode system prompt.
    #[must_use]
    pub fn scan_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.scan_prompt = Some(prompt.into());
        self
    }

    /// Sets the response markers.
    #[must_use]
    pub fn markers(mut self, markers: Markers) -> Self {
        self.markers = Some(markers);
        self
    }

    /// Sets the retry schedule.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the configuration, failing on an empty key pool.
    pub fn build(self) -> Result<QgenConfig> {
        if self.keys.is_empty() {
            return Err(QgenError::configuration("key pool is empty"));
        }
        Ok(QgenConfig {
            model_name: self
                .model_name
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            keys: self.keys,
            generation_prompt: self
                .generation_prompt
                .unwrap_or_else(|| DEFAULT_GENERATION_PROMPT.to_string()),
            scan_prompt: self
                .scan_prompt
                .unwrap_or_else(|| DEFAULT_SCAN_PROMPT.to_string()),
            markers: self.markers.unwrap_or_default(),
            retry: self.retry.unwrap_or_default()
        })
    }
}
