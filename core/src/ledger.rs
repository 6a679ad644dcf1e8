//! Artifact fingerprinting and the simulated Qubic ledger commit.
//!
//! The "commit" is a deterministic hash-derived identifier, not a
//! consensus write; it sits behind [`AuditLedger`] so a real integration
//! can be substituted without touching the core.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::audit::StructuredAudit;

/// Lowercase hex SHA-256 of the artifact's exact byte content.
///
/// Deterministic: identical bytes always yield the identical digest.
pub fn fingerprint(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex_encode(digest.as_slice())
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Current UTC timestamp, ISO 8601 at seconds precision with a `Z` suffix.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Ledger collaborator: turns a fingerprint and its audit into an opaque
/// transaction identifier.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Records a generated artifact; returns the transaction id.
    async fn commit_generation(&self, code_hash: &str, audit: &StructuredAudit) -> String;
    /// Records a scan of externally supplied code; returns the transaction id.
    async fn commit_scan(&self, code_hash: &str, audit: &StructuredAudit) -> String;
}

/// Simulated Qubic ledger producing deterministic mock transaction ids.
///
/// Two commits with identical fingerprint and timestamp produce identical
/// ids; this is an intentional idempotent simulated entry, not a collision.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockQubicLedger;

impl MockQubicLedger {
    pub fn new() -> Self {
        Self
    }

    fn transaction_id(prefix: &str, seed: &str) -> String {
        let digest = fingerprint(seed.as_bytes());
        format!("{prefix}-{}", digest[..16].to_uppercase())
    }

    fn submission_timestamp(audit: &StructuredAudit) -> String {
        audit
            .get("meta")
            .and_then(|meta| meta.get("submission_timestamp"))
            .and_then(|ts| ts.as_str())
            .unwrap_or_default()
            .to_string()
    }
}

#[async_trait]
impl AuditLedger for MockQubicLedger {
    async fn commit_generation(&self, code_hash: &str, audit: &StructuredAudit) -> String {
        let seed = format!("{code_hash}-{}", Self::submission_timestamp(audit));
        let tx = Self::transaction_id("QUBIC-TX", &seed);
        tracing::info!(code_hash, tx = %tx, "Simulated generation commit");
        tx
    }

    async fn commit_scan(&self, code_hash: &str, audit: &StructuredAudit) -> String {
        let seed = format!("SCAN-{code_hash}-{}", Self::submission_timestamp(audit));
        let tx = Self::transaction_id("QUBIC-SCAN-TX", &seed);
        tracing::info!(code_hash, tx = %tx, "Simulated scan commit");
        tx
    }
}
