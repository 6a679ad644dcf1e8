//! Server setup and lifecycle for the Q-Gen API.

use std::net::SocketAddr;
use std::sync::Arc;

use qgen_core::QgenConfig;
use tokio::net::TcpListener;
use tokio::signal;

use crate::error::{ApiError, Result};
use crate::routes::create_router;
use crate::state::{ApiConfig, AppState};

/// The Q-Gen API server.
pub struct QgenServer {
    state: Arc<AppState>,
    config: ApiConfig
}

impl QgenServer {
    /// Creates a server from API and core configuration.
    pub fn new(api_config: ApiConfig, core_config: QgenConfig) -> Result<Self> {
        let state = Arc::new(AppState::from_configs(api_config.clone(), core_config)?);
        Ok(Self {
            state,
            config: api_config
        })
    }

    /// Creates a server from pre-built state, for tests.
    pub fn with_state(state: Arc<AppState>) -> Self {
        let config = state.config.clone();
        Self { state, config }
    }

    /// Runs the HTTP server until shutdown (Ctrl+C or SIGTERM).
    pub async fn run(self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ApiError::Internal(format!("Invalid bind address: {e}")))?;

        let router = create_router(self.state.clone())
            .into_make_service_with_connect_info::<SocketAddr>();

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!(%addr, "Q-Gen API server starting");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Internal(format!("Server error: {e}")))?;

        tracing::info!("Q-Gen API server stopped");
        Ok(())
    }

    /// Returns a reference to the application state.
    #[must_use]
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }
}

/// Signal handler for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        () = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        },
    }
}

/// Entry point for running the server from environment variables.
pub async fn run_from_env() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .init();

    let core_config = QgenConfig::from_env().map_err(|e| ApiError::Internal(e.to_string()))?;
    let api_config = ApiConfig::from_env();

    tracing::info!(
        model = %core_config.model_name,
        keys = core_config.keys.len(),
        "Configuration loaded"
    );

    QgenServer::new(api_config, core_config)?.run().await
}
