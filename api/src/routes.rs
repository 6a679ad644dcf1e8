//! Route definitions for the Q-Gen API.

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post}
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer
};

use crate::handlers;
use crate::rate_limit::rate_limit_middleware;
use crate::state::AppState;

/// Creates the axum router with all routes configured.
pub fn create_router(state: Arc<AppState>) -> Router {
    // The frontend is served from arbitrary origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/generate", post(handlers::generate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware
        ))
        .route("/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
