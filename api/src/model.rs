//! Inbound request and outbound response models.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Dual-mode request body: exactly one of `user_prompt` (generation) or
/// `contract_code` (scan) must be set.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QgenRequest {
    /// Natural-language request for code generation.
    #[validate(length(min = 10, max = 4000))]
    pub user_prompt: Option<String>,

    /// Raw C++ contract code to be audited.
    #[validate(length(min = 50, max = 50000))]
    pub contract_code: Option<String>,

    /// ISO 639-1 language code for the audit report. Scan mode only.
    #[validate(length(equal = 2))]
    pub report_language: Option<String>,

    /// Caller-supplied reference recorded in the commit metadata.
    pub client_ref_id: Option<String>
}

impl QgenRequest {
    /// Trimmed generation prompt, when present and non-empty.
    pub fn prompt(&self) -> Option<&str> {
        self.user_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Trimmed contract code, when present and non-empty.
    pub fn code(&self) -> Option<&str> {
        self.contract_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Report language, defaulting to English.
    pub fn language(&self) -> &str {
        self.report_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("en")
    }
}

/// Response envelope for both modes.
#[derive(Debug, Serialize)]
pub struct QgenResponse {
    pub status: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<String>,
    pub security_audit: Value,
    pub qubic_transaction_id: String,
    pub code_hash: String,
    pub duration_seconds: f64
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub app: String
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(prompt: Option<&str>, code: Option<&str>) -> QgenRequest {
        QgenRequest {
            user_prompt: prompt.map(String::from),
            contract_code: code.map(String::from),
            report_language: None,
            client_ref_id: None
        }
    }

    #[test]
    fn test_prompt_bounds() {
        assert!(request(Some("too short"), None).validate().is_err());
        assert!(request(Some("long enough prompt"), None).validate().is_ok());
        assert!(request(Some(&"x".repeat(4001)), None).validate().is_err());
    }

    #[test]
    fn test_code_bounds() {
        assert!(request(None, Some("short code")).validate().is_err());
        assert!(request(None, Some(&"c".repeat(50))).validate().is_ok());
        assert!(request(None, Some(&"c".repeat(50001))).validate().is_err());
    }

    #[test]
    fn test_language_must_be_two_chars() {
        let mut req = request(None, Some(&"c".repeat(100)));
        req.report_language = Some("fra".to_string());
        assert!(req.validate().is_err());
        req.report_language = Some("fr".to_string());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_language_defaults_to_english() {
        assert_eq!(request(None, None).language(), "en");
    }

    #[test]
    fn test_whitespace_only_fields_count_as_absent() {
        let req = request(Some("            "), Some("      \n    "));
        assert!(req.prompt().is_none());
        assert!(req.code().is_none());
    }
}
