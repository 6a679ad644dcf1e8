//! Remote model adapter and the cached client factory.
//!
//! Failure classification happens here, at the adapter boundary: the
//! orchestrator only ever sees typed [`ModelError`] kinds, never raw HTTP
//! errors or message substrings.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::config::QgenConfig;
use crate::keys::KeyPool;

/// The four recognized harm categories, all set to "do not block" so the
/// model answers even when it considers contract code dangerous.
const PERMISSIVE_SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT"
];

/// Typed failure kinds from a remote model call.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Quota exhaustion / HTTP 429. Triggers key rotation upstream.
    #[error("Rate limited by remote model")]
    RateLimited,

    /// Server-side failure (HTTP 5xx).
    #[error("Remote model unavailable: status {status}")]
    ServerUnavailable { status: u16 },

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with something we cannot interpret.
    #[error("Malformed model response: {detail}")]
    Malformed { detail: String }
}

/// Per-category probability rating attached to a safety block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String
}

/// Signal that the model declined to produce text.
#[derive(Debug, Clone)]
pub struct BlockSignal {
    pub reason: String,
    pub ratings: Vec<SafetyRating>
}

/// Raw outcome of one model call: an opaque text blob, plus a block signal
/// when the model declined.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub block: Option<BlockSignal>
}

/// Seam for the remote generative model, so tests can inject mocks.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, ModelError>;
}

// --- Wire DTOs for the generateContent REST call ---

#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(rename = "safetySettings")]
    safety_settings: Vec<SafetySetting>
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str
}

#[derive(Debug, Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
    #[serde(rename = "safetyRatings", default)]
    safety_ratings: Vec<SafetyRating>
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
    #[serde(rename = "safetyRatings", default)]
    safety_ratings: Vec<SafetyRating>
}

/// reqwest-backed client bound to exactly one API key and one fixed model
/// configuration.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model_name: String,
    api_key: String
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model_name: &str,
        api_key: &str
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model_name: model_name.to_string(),
            api_key: api_key.to_string()
        })
    }

    fn permissive_safety_settings() -> Vec<SafetySetting> {
        PERMISSIVE_SAFETY_CATEGORIES
            .iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_NONE"
            })
            .collect()
    }
}

#[async_trait]
impl GenerativeModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<ModelResponse, ModelError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, self.model_name
        );
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }]
            }],
            safety_settings: Self::permissive_safety_settings()
        };

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ModelError::RateLimited);
        }
        if status.is_server_error() {
            return Err(ModelError::ServerUnavailable {
                status: status.as_u16()
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Malformed {
                detail: format!("status {status}: {body}")
            });
        }

        let parsed: GenerateContentResponse =
            response.json().await.map_err(|e| ModelError::Malformed {
                detail: format!("invalid response body: {e}")
            })?;

        // Prompt-level block: no candidates at all.
        if let Some(feedback) = &parsed.prompt_feedback {
            if let Some(reason) = &feedback.block_reason {
                return Ok(ModelResponse {
                    text: String::new(),
                    block: Some(BlockSignal {
                        reason: reason.clone(),
                        ratings: feedback.safety_ratings.clone()
                    })
                });
            }
        }

        let Some(candidate) = parsed.candidates.into_iter().next() else {
            return Ok(ModelResponse {
                text: String::new(),
                block: Some(BlockSignal {
                    reason: "NO_CANDIDATES".to_string(),
                    ratings: Vec::new()
                })
            });
        };

        let text: String = candidate
            .content
            .as_ref()
            .map(|c| {
                c.parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        // Candidate-level block: finished for a non-STOP reason with no text.
        if text.is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "EMPTY_RESPONSE".to_string());
            return Ok(ModelResponse {
                text,
                block: Some(BlockSignal {
                    reason,
                    ratings: candidate.safety_ratings
                })
            });
        }

        Ok(ModelResponse { text, block: None })
    }
}

/// Lazily builds and caches a client bound to the pool's current key.
///
/// Rotation advances the pool and drops the cache under one write lock so a
/// rotation always fully replaces the active client before the next call
/// using it is issued.
pub struct ClientFactory {
    pool: KeyPool,
    base_url: String,
    model_name: String,
    cached: RwLock<Option<Arc<GeminiClient>>>
}

impl ClientFactory {
    pub fn new(config: &QgenConfig) -> Result<Self, crate::error::QgenError> {
        Ok(Self {
            pool: KeyPool::new(config.keys.clone())?,
            base_url: config.api_base_url.clone(),
            model_name: config.model_name.clone(),
            cached: RwLock::new(None)
        })
    }

    /// Returns the cached client, building one for the current key when
    /// absent. A construction failure yields `None`; the caller must treat
    /// that as "unavailable, do not call this attempt".
    pub async fn get(&self) -> Option<Arc<GeminiClient>> {
        {
            let cached = self.cached.read().await;
            if let Some(client) = cached.as_ref() {
                return Some(client.clone());
            }
        }

        let mut cached = self.cached.write().await;
        if let Some(client) = cached.as_ref() {
            return Some(client.clone());
        }
        match GeminiClient::new(&self.base_url, &self.model_name, self.pool.current()) {
            Ok(client) => {
                let client = Arc::new(client);
                *cached = Some(client.clone());
                Some(client)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize model client");
                None
            }
        }
    }

    /// Advances to the next key and invalidates the cached client.
    pub async fn rotate(&self) {
        let mut cached = self.cached.write().await;
        self.pool.rotate();
        *cached = None;
    }

    /// Total rotations performed since startup.
    pub fn rotations(&self) -> usize {
        self.pool.rotations()
    }

    /// Number of keys in the pool.
    pub fn pool_len(&self) -> usize {
        self.pool.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(keys: Vec<String>) -> QgenConfig {
        QgenConfig::builder().keys(keys).build().unwrap()
    }

    #[test]
    fn test_safety_settings_cover_four_categories() {
        let settings = GeminiClient::permissive_safety_settings();
        assert_eq!(settings.len(), 4);
        assert!(settings.iter().all(|s| s.threshold == "BLOCK_NONE"));
    }

    #[tokio::test]
    async fn test_factory_caches_client() {
        let factory = ClientFactory::new(&test_config(vec!["k1".into()])).unwrap();
        let first = factory.get().await.unwrap();
        let second = factory.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_rotation_invalidates_cache() {
        let factory =
            ClientFactory::new(&test_config(vec!["k1".into(), "k2".into()])).unwrap();
        let first = factory.get().await.unwrap();
        factory.rotate().await;
        let second = factory.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.api_key, "k2");
        assert_eq!(factory.rotations(), 1);
    }

    #[test]
    fn test_block_response_deserializes() {
        let body = r#"{
            "candidates": [],
            "promptFeedback": {
                "blockReason": "SAFETY",
                "safetyRatings": [
                    {"category": "HARM_CATEGORY_DANGEROUS_CONTENT", "probability": "HIGH"}
                ]
            }
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let feedback = parsed.prompt_feedback.unwrap();
        assert_eq!(feedback.block_reason.as_deref(), Some("SAFETY"));
        assert_eq!(feedback.safety_ratings.len(), 1);
    }

    #[test]
    fn test_text_response_deserializes() {
        let body = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "hello "}, {"text": "world"}]},
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(body).unwrap();
        let candidate = &parsed.candidates[0];
        let text: String = candidate
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "hello world");
    }
}
