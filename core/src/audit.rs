//! Structured audit object and the normalizer that heals missing keys.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Audit object returned by the model: a passthrough JSON mapping with a
/// small set of guaranteed keys (see [`StructuredAudit::normalize`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredAudit(pub Map<String, Value>);

impl StructuredAudit {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wraps a JSON value; non-object values become an empty mapping.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new())
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Returns the object under `key`, replacing anything that is absent or
    /// not an object.
    pub fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let entry = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        entry.as_object_mut().unwrap()
    }

    /// Heals required-but-missing keys so downstream consumers never see a
    /// missing `compliance.ai_governance.model_name` or `security_audit`.
    ///
    /// Pure in effect, total over any mapping, and idempotent: applying it
    /// twice yields the same result as applying it once. Keys that are
    /// already present and well-typed are never removed or overwritten.
    pub fn normalize(&mut self, model_name: &str) {
        let compliance = self.object_mut("compliance");
        let governance = compliance
            .entry("ai_governance".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !governance.is_object() {
            *governance = Value::Object(Map::new());
        }
        governance
            .as_object_mut()
            .unwrap()
            .entry("model_name".to_string())
            .or_insert_with(|| Value::String(model_name.to_string()));

        let security = self.object_mut("security_audit");
        security
            .entry("vulnerabilities_detected".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        security
            .entry("gas_cost_estimate".to_string())
            .or_insert_with(|| Value::String("UNKNOWN".to_string()));
        security
            .entry("is_qbc_compliant".to_string())
            .or_insert(Value::Bool(false));
    }

    /// Placeholder audit used when extraction or the whole call failed.
    pub fn placeholder(contract_id: &str, note: Option<String>) -> Self {
        let mut audit = Self::from_value(json!({ "contract_id": contract_id }));
        if let Some(note) = note {
            audit.insert("agent_note", Value::String(note));
        }
        audit
    }
}

impl Default for StructuredAudit {
    fn default() -> Self {
        Self::new()
    }
}
