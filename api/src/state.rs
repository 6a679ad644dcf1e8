//! Application state and server configuration for the Q-Gen API.

use std::sync::Arc;

use qgen_core::{AuditLedger, MockQubicLedger, Orchestrator, QgenConfig};

use crate::error::{ApiError, Result};
use crate::rate_limit::RateLimiter;

/// Configuration for the Q-Gen API server.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind the server to.
    pub host: String,
    /// Port to bind the server to.
    pub port: u16,
    /// Requests allowed per client IP within the window.
    pub rate_limit_max_requests: u32,
    /// Rate-limit window in seconds.
    pub rate_limit_window_secs: u64,
    /// Default client reference recorded with each commit.
    pub default_client_ref: String
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            rate_limit_max_requests: 5,
            rate_limit_window_secs: 60,
            default_client_ref: "POC-HACKATHON-2025".to_string()
        }
    }
}

impl ApiConfig {
    /// Creates a configuration from environment variables, with defaults
    /// for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            rate_limit_max_requests: std::env::var("RATE_LIMIT_MAX_REQUESTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_max_requests),
            rate_limit_window_secs: std::env::var("RATE_LIMIT_WINDOW_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.rate_limit_window_secs),
            default_client_ref: std::env::var("QGEN_CLIENT_REF")
                .unwrap_or(defaults.default_client_ref)
        }
    }
}

/// Shared state behind every handler.
pub struct AppState {
    pub config: ApiConfig,
    pub orchestrator: Orchestrator,
    pub ledger: Arc<dyn AuditLedger>,
    pub limiter: RateLimiter
}

impl AppState {
    /// Wires the state from an orchestrator and ledger, for tests and
    /// custom deployments.
    pub fn new(
        config: ApiConfig,
        orchestrator: Orchestrator,
        ledger: Arc<dyn AuditLedger>
    ) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window_secs
        );
        Self {
            config,
            orchestrator,
            ledger,
            limiter
        }
    }

    /// Builds production state: reqwest-backed orchestrator plus the
    /// simulated Qubic ledger.
    pub fn from_configs(api_config: ApiConfig, core_config: QgenConfig) -> Result<Self> {
        let orchestrator = Orchestrator::from_config(core_config)
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        Ok(Self::new(
            api_config,
            orchestrator,
            Arc::new(MockQubicLedger::new())
        ))
    }
}
