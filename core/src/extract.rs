//! Layered extraction of structured artifacts from free model text.
//!
//! Models reliably emit the code and audit artifacts adjacently but not
//! always inside exact delimiters, so extraction is an ordered list of
//! strategies, each a pure function over the raw text, tried in sequence
//! until one succeeds. The terminal fallback always produces something
//! renderable: extraction never fails and never panics.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::audit::StructuredAudit;
use crate::config::Markers;

/// Result of generation-mode extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedArtifact {
    pub code: String,
    pub audit: StructuredAudit
}

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:cpp|c\+\+|json)?").unwrap());

/// Recovers a code artifact and an audit object from generation-mode text.
///
/// Strategies, first success wins:
/// 1. strict dual-tag extraction,
/// 2. heuristic split around the trailing JSON object,
/// 3. raw passthrough with a placeholder audit.
pub fn extract_generation(
    text: &str,
    markers: &Markers,
    model_name: &str
) -> GeneratedArtifact {
    let (code, mut audit) = strict_dual_tag(text, markers)
        .or_else(|| heuristic_split(text, markers))
        .unwrap_or_else(|| {
            tracing::warn!(len = text.len(), "Extraction failed, passing raw output through");
            raw_passthrough(text)
        });
    audit.normalize(model_name);
    GeneratedArtifact { code, audit }
}

/// Recovers an audit object from scan-mode text.
///
/// Strategies: strict single-tag extraction, then the first-`{`/last-`}`
/// span, then a placeholder carrying a truncated excerpt of the raw text.
pub fn extract_scan(text: &str, markers: &Markers, model_name: &str) -> StructuredAudit {
    let mut audit = tagged_span(text, &markers.json_start, &markers.json_end)
        .and_then(|span| parse_json_object(span))
        .or_else(|| brace_span(text).and_then(parse_json_object))
        .unwrap_or_else(|| {
            tracing::warn!(len = text.len(), "Scan extraction failed, returning placeholder");
            StructuredAudit::placeholder(
                "RAW-SCAN-OUTPUT",
                Some(format!("Raw output: {}...", truncate_chars(text, 200)))
            )
        });
    audit.normalize(model_name);
    audit
}

/// Strategy 1: both marker pairs present and the JSON span parses.
fn strict_dual_tag(text: &str, markers: &Markers) -> Option<(String, StructuredAudit)> {
    let code = tagged_span(text, &markers.code_start, &markers.code_end)?;
    let json = tagged_span(text, &markers.json_start, &markers.json_end)?;
    let audit = parse_json_object(&strip_fences(json))?;
    Some((code.trim().to_string(), audit))
}

/// Strategy 2: the last `}` ends the audit object; its opening `{` is
/// searched from roughly the two-thirds point (falling back to the first
/// `{` anywhere); everything before the span is code.
fn heuristic_split(text: &str, markers: &Markers) -> Option<(String, StructuredAudit)> {
    let json_end = text.rfind('}')?;
    let pivot = floor_char_boundary(text, text.len() / 3);
    let json_start = text[pivot..]
        .find('{')
        .map(|i| pivot + i)
        .filter(|&i| i <= json_end)
        .or_else(|| text.find('{'))?;
    if json_start > json_end {
        return None;
    }

    let audit = parse_json_object(&text[json_start..=json_end])?;

    let mut code = text[..json_start].trim().to_string();
    code = strip_fences(&code);
    code = code
        .replace(&markers.code_start, "")
        .replace(&markers.code_end, "")
        .replace(&markers.json_start, "");
    Some((code.trim().to_string(), audit))
}

/// Strategy 3: return the whole raw text annotated as unparsed, plus a
/// minimal placeholder audit for the normalizer to complete.
fn raw_passthrough(text: &str) -> (String, StructuredAudit) {
    let code = format!(
        "// --- RAW UNPARSED OUTPUT ---\n// The parser failed, but here is what the model \
         said:\n\n{text}"
    );
    let mut audit = StructuredAudit::placeholder(
        "DEBUG-RAW",
        Some("Displayed raw output for debugging.".to_string())
    );
    audit.insert("contract_type", Value::String("Debug".to_string()));
    audit.insert(
        "input_prompt_summary",
        Value::String("Raw Output Display".to_string())
    );
    (code, audit)
}

/// Text between the first occurrence of `start` and the next `end` after it.
fn tagged_span<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let to = text[from..].find(end)? + from;
    Some(&text[from..to])
}

/// The first-`{`-to-last-`}` span, when both exist in order.
fn brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start <= end).then(|| &text[start..=end])
}

/// Parses a span as a JSON object; anything else fails the strategy.
fn parse_json_object(span: &str) -> Option<StructuredAudit> {
    match serde_json::from_str::<Value>(span.trim()) {
        Ok(Value::Object(map)) => Some(StructuredAudit(map)),
        _ => None
    }
}

fn strip_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Largest char boundary at or below `index`.
fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// First `max` characters of `text`, cut on a char boundary.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((i, _)) => &text[..i],
        None => text
    }
}
