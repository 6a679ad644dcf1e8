//! HTTP boundary for the Q-Gen contract generator/scanner.

pub mod error;
pub mod handlers;
pub mod model;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;
