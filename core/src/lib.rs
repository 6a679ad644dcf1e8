//! # Q-Gen Core
//!
//! Request-resilience and output-recovery core for the Q-Gen contract
//! generator/scanner: API key rotation on quota exhaustion, retry with
//! backoff, layered extraction of structured artifacts from free model
//! text, and deterministic fingerprinting of the exchange.

pub mod audit;
pub mod client;
pub mod config;
pub mod error;
pub mod extract;
pub mod keys;
pub mod ledger;
pub mod orchestrator;

pub use audit::StructuredAudit;
pub use client::{BlockSignal, GenerativeModel, ModelError, ModelResponse};
pub use config::{Markers, QgenConfig, RetryPolicy};
pub use error::{QgenError, Result};
pub use extract::GeneratedArtifact;
pub use ledger::{AuditLedger, MockQubicLedger, fingerprint, now_iso};
pub use orchestrator::{ModelSource, Orchestrator};
