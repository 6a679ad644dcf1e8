//! Drives the retry loop around the remote model: send, classify, rotate
//! or back off, and always hand the caller a well-formed result.

use std::sync::Arc;

use async_trait::async_trait;

use crate::audit::StructuredAudit;
use crate::client::{ClientFactory, GenerativeModel, ModelError};
use crate::config::QgenConfig;
use crate::error::{QgenError, Result};
use crate::extract::{GeneratedArtifact, extract_generation, extract_scan};

/// Source of the active model client. Lets tests swap the reqwest-backed
/// factory for a scripted mock while keeping rotation observable.
#[async_trait]
pub trait ModelSource: Send + Sync {
    /// Current client, or `None` when construction failed.
    async fn get(&self) -> Option<Arc<dyn GenerativeModel>>;
    /// Advances the credential pool and invalidates the active client.
    async fn rotate(&self);
}

#[async_trait]
impl ModelSource for ClientFactory {
    async fn get(&self) -> Option<Arc<dyn GenerativeModel>> {
        ClientFactory::get(self)
            .await
            .map(|client| client as Arc<dyn GenerativeModel>)
    }

    async fn rotate(&self) {
        ClientFactory::rotate(self).await;
    }
}

/// Outcome of the shared retry loop.
enum CallOutcome {
    /// Non-empty model text, ready for extraction.
    Text(String),
    /// Attempt budget exhausted; carries the last recorded failure message.
    Exhausted(String)
}

/// Orchestrates generation and scan calls against the remote model.
pub struct Orchestrator {
    source: Arc<dyn ModelSource>,
    config: QgenConfig
}

impl Orchestrator {
    pub fn new(source: Arc<dyn ModelSource>, config: QgenConfig) -> Self {
        Self { source, config }
    }

    /// Builds an orchestrator backed by the reqwest client factory.
    pub fn from_config(config: QgenConfig) -> Result<Self> {
        let factory = ClientFactory::new(&config)?;
        Ok(Self::new(Arc::new(factory), config))
    }

    /// Generates contract code plus a structured audit for a user prompt.
    ///
    /// Only an unavailable client is an error; every other failure mode
    /// degrades into a placeholder artifact after the retry budget.
    pub async fn generate(&self, user_prompt: &str) -> Result<GeneratedArtifact> {
        let prompt = format!(
            "{}\n\nUSER REQUEST: {}",
            self.config.generation_prompt, user_prompt
        );

        match self.call_with_retries(&prompt).await? {
            CallOutcome::Text(text) => Ok(extract_generation(
                &text,
                &self.config.markers,
                &self.config.model_name
            )),
            CallOutcome::Exhausted(last_failure) => {
                tracing::error!(last_failure = %last_failure, "Generation exhausted retry budget");
                let code = format!(
                    "// Error: model failed to respond or was blocked.\n// Last failure: \
                     {last_failure}"
                );
                let mut audit = StructuredAudit::placeholder(
                    "ERR-NO-RESPONSE",
                    Some(format!("Generation failed: {last_failure}"))
                );
                audit.normalize(&self.config.model_name);
                Ok(GeneratedArtifact { code, audit })
            }
        }
    }

    /// Audits existing contract code, reporting in `report_language`.
    pub async fn scan(
        &self,
        contract_code: &str,
        report_language: &str
    ) -> Result<StructuredAudit> {
        let prompt = format!(
            "{}\n\nCODE:\n{}\nLANG: {}",
            self.config.scan_prompt, contract_code, report_language
        );

        match self.call_with_retries(&prompt).await? {
            CallOutcome::Text(text) => Ok(extract_scan(
                &text,
                &self.config.markers,
                &self.config.model_name
            )),
            CallOutcome::Exhausted(last_failure) => {
                tracing::error!(last_failure = %last_failure, "Scan exhausted retry budget");
                let mut audit = StructuredAudit::placeholder(
                    "ERR-SCAN-FAILED",
                    Some(format!("Scan failed: {last_failure}"))
                );
                audit.normalize(&self.config.model_name);
                Ok(audit)
            }
        }
    }

    /// The shared retry loop. Per attempt: obtain a client (or terminate
    /// with `ClientUnavailable`, not retried), call the model, then either
    /// return the text, rotate on rate limits, or back off and retry.
    async fn call_with_retries(&self, prompt: &str) -> Result<CallOutcome> {
        let retry = &self.config.retry;
        let mut last_failure = String::from("no attempt completed");

        for attempt in 1..=retry.max_attempts {
            let Some(client) = self.source.get().await else {
                return Err(QgenError::ClientUnavailable);
            };

            tracing::debug!(attempt, "Sending model request");
            match client.generate(prompt).await {
                Ok(response) if !response.text.is_empty() => {
                    tracing::debug!(attempt, chars = response.text.len(), "Model responded");
                    return Ok(CallOutcome::Text(response.text));
                }
                Ok(response) => {
                    let block = response.block.unwrap_or_else(|| crate::client::BlockSignal {
                        reason: "EMPTY_RESPONSE".to_string(),
                        ratings: Vec::new()
                    });
                    tracing::warn!(
                        attempt,
                        reason = %block.reason,
                        ratings = ?block.ratings,
                        "Model blocked the request"
                    );
                    last_failure = format!("blocked: {}", block.reason);
                    if self.block_is_quota(&block.reason) {
                        self.rotate_if_attempts_remain(attempt).await;
                    } else {
                        tokio::time::sleep(retry.blocked_delay).await;
                    }
                }
                Err(ModelError::RateLimited) => {
                    tracing::warn!(attempt, "Rate limited, rotating key");
                    last_failure = "rate limited (quota exhausted / HTTP 429)".to_string();
                    // Retry immediately on the next key, no backoff.
                    self.rotate_if_attempts_remain(attempt).await;
                }
                Err(ModelError::ServerUnavailable { status }) => {
                    tracing::warn!(attempt, status, "Transient server error");
                    last_failure = format!("server error: status {status}");
                    tokio::time::sleep(retry.transient_backoff * attempt).await;
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Model call failed");
                    last_failure = e.to_string();
                    tokio::time::sleep(retry.unknown_backoff * attempt).await;
                }
            }
        }

        Ok(CallOutcome::Exhausted(last_failure))
    }

    /// A safety block is treated as quota exhaustion when its reason text
    /// carries a quota indicator, or unconditionally when configured.
    fn block_is_quota(&self, reason: &str) -> bool {
        if self.config.retry.rotate_on_any_block {
            return true;
        }
        let lower = reason.to_lowercase();
        lower.contains("429") || lower.contains("quota") || lower.contains("exhausted")
    }

    async fn rotate_if_attempts_remain(&self, attempt: u32) {
        if attempt < self.config.retry.max_attempts {
            self.source.rotate().await;
        }
    }
}
