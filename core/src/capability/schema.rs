//! Schema helpers
//!
//! Required-field validation plus the prompt/provider views of a capability
//! list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use super::{Capability, Input};
use crate::error::ExecError;

/// Provider-facing description of a capability (OpenAI tools shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub parameters: Value,
}

/// Field names listed under the schema's `required` key.
///
/// Non-string entries are skipped; a missing or malformed key yields nothing.
pub fn required_fields(schema: &Value) -> Vec<&str> {
    schema
        .get("required")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

/// Check that every required field is present. Types are not checked here.
pub fn validate_input(capability: &dyn Capability, input: &Input) -> Result<(), ExecError> {
    let schema = capability.input_schema();
    match required_fields(&schema)
        .into_iter()
        .find(|field| !input.contains_key(*field))
    {
        Some(field) => Err(ExecError::Validation {
            field: field.to_string(),
        }),
        None => Ok(()),
    }
}

/// Render a readable list for prompt injection
pub fn format_capabilities(capabilities: &[Arc<dyn Capability>]) -> String {
    if capabilities.is_empty() {
        return "no capabilities available".to_string();
    }
    capabilities
        .iter()
        .map(|c| format!("- {}: {}", c.name(), c.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Case-insensitive lookup in a plain list
pub fn find_in(capabilities: &[Arc<dyn Capability>], name: &str) -> Option<Arc<dyn Capability>> {
    let target = name.to_lowercase();
    capabilities
        .iter()
        .find(|c| c.name().to_lowercase() == target)
        .cloned()
}

pub fn to_definition(capability: &dyn Capability) -> CapabilityDefinition {
    CapabilityDefinition {
        kind: "function".to_string(),
        function: FunctionDefinition {
            name: capability.name().to_string(),
            description: capability.description().to_string(),
            parameters: capability.input_schema(),
        },
    }
}

pub fn to_definitions(capabilities: &[Arc<dyn Capability>]) -> Vec<CapabilityDefinition> {
    capabilities.iter().map(|c| to_definition(c.as_ref())).collect()
}
