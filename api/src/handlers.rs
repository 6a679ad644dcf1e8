//! HTTP request handlers for the Q-Gen API.

use std::sync::Arc;
use std::time::Instant;

use axum::{Json, extract::State};
use serde_json::{Value, json};
use validator::Validate;

use qgen_core::{StructuredAudit, fingerprint, now_iso};

use crate::error::{ApiError, Result};
use crate::model::{HealthResponse, QgenRequest, QgenResponse};
use crate::state::AppState;

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        app: "Q-Gen API".to_string()
    })
}

/// Dual-mode entry point for `POST /generate`.
///
/// Generation mode runs on `user_prompt`; scan mode on `contract_code`.
/// Exactly one must be present.
pub async fn generate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<QgenRequest>
) -> Result<Json<QgenResponse>> {
    let started = Instant::now();

    body.validate()
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    let prompt = body.prompt();
    let code = body.code();
    match (prompt, code) {
        (Some(_), Some(_)) => {
            return Err(ApiError::InvalidRequest(
                "Request cannot contain both 'user_prompt' and 'contract_code'".to_string()
            ));
        }
        (None, None) => {
            return Err(ApiError::InvalidRequest(
                "Request must contain either 'user_prompt' or 'contract_code'".to_string()
            ));
        }
        _ => {}
    }

    let client_ref = body
        .client_ref_id
        .clone()
        .unwrap_or_else(|| state.config.default_client_ref.clone());

    if let Some(prompt) = prompt {
        handle_generation(&state, prompt, &client_ref, started).await
    } else {
        let code = code.unwrap();
        handle_scan(&state, code, body.language(), &client_ref, started).await
    }
}

async fn handle_generation(
    state: &AppState,
    prompt: &str,
    client_ref: &str,
    started: Instant
) -> Result<Json<QgenResponse>> {
    tracing::info!(prompt_preview = %preview(prompt, 50), "Generation request");

    let mut artifact = state.orchestrator.generate(prompt).await?;
    let code_hash = fingerprint(artifact.code.as_bytes());

    stamp_audit(
        &mut artifact.audit,
        client_ref,
        &code_hash,
        "generated_code_hash",
        "GENERATION"
    );

    let transaction_id = state
        .ledger
        .commit_generation(&code_hash, &artifact.audit)
        .await;

    let duration = started.elapsed().as_secs_f64();
    tracing::info!(code_hash = %code_hash, duration, "Generation committed");

    Ok(Json(QgenResponse {
        status: "success".to_string(),
        mode: "GENERATION".to_string(),
        generated_code: Some(artifact.code),
        security_audit: artifact.audit.into_value(),
        qubic_transaction_id: transaction_id,
        code_hash,
        duration_seconds: round2(duration)
    }))
}

async fn handle_scan(
    state: &AppState,
    code: &str,
    language: &str,
    client_ref: &str,
    started: Instant
) -> Result<Json<QgenResponse>> {
    tracing::info!(code_len = code.len(), language, "Scan request");

    let mut audit = state.orchestrator.scan(code, language).await?;
    let code_hash = fingerprint(code.as_bytes());

    stamp_audit(
        &mut audit,
        client_ref,
        &code_hash,
        "scanned_code_hash",
        "SCANNING"
    );

    let transaction_id = state.ledger.commit_scan(&code_hash, &audit).await;

    let duration = started.elapsed().as_secs_f64();
    tracing::info!(code_hash = %code_hash, duration, "Scan committed");

    Ok(Json(QgenResponse {
        status: "success".to_string(),
        mode: "SCANNING".to_string(),
        generated_code: None,
        security_audit: audit.into_value(),
        qubic_transaction_id: transaction_id,
        code_hash,
        duration_seconds: round2(duration)
    }))
}

/// Records the audit timestamp and commit metadata on the audit object.
/// The orchestrator has already normalized it, so the governance path
/// exists.
fn stamp_audit(
    audit: &mut StructuredAudit,
    client_ref: &str,
    code_hash: &str,
    hash_key: &str,
    mode: &str
) {
    let compliance = audit.object_mut("compliance");
    if let Some(governance) = compliance
        .get_mut("ai_governance")
        .and_then(Value::as_object_mut)
    {
        governance.insert("audit_timestamp".to_string(), json!(now_iso()));
    }
    audit.insert(
        "meta",
        json!({
            "client_ref_id": client_ref,
            hash_key: code_hash,
            "mode": mode
        })
    );
}

fn preview(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
