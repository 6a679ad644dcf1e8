//! Error taxonomy for the Q-Gen core.
//!
//! Extraction failures are deliberately absent here: the extractor always
//! resolves into a best-effort payload, so the only errors that escape the
//! core are startup configuration problems and an unavailable client.

use thiserror::Error;

/// Result type alias for the core.
pub type Result<T> = std::result::Result<T, QgenError>;

#[derive(Debug, Error)]
pub enum QgenError {
    /// Fatal startup problem: empty key pool, empty prompt template.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The factory could not build a model client for the current key.
    /// Short-circuits the call; never retried.
    #[error("Model client unavailable")]
    ClientUnavailable
}

impl QgenError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into()
        }
    }
}
