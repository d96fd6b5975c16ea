//! JSON-Schema validation. Wraps the `jsonschema` crate and renders field
//! paths in a dotted form (`data.0.id`, not raw JSON-pointer `/data/0/id`).

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema is not valid JSON: {0}")]
    InvalidSchemaJson(#[from] serde_json::Error),
    #[error("schema failed to compile: {0}")]
    Compile(String),
}

/// Outcome of validating one JSON document against one schema.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: HashMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validates a decoded JSON value against a JSON Schema document supplied
/// as a string. An empty schema string means "no constraint" and trivially
/// succeeds.
pub fn validate(document: &serde_json::Value, schema: &str) -> Result<ValidationReport, SchemaError> {
    if schema.trim().is_empty() {
        return Ok(ValidationReport::default());
    }

    let schema_value: serde_json::Value = serde_json::from_str(schema)?;
    let validator = jsonschema::validator_for(&schema_value)
        .map_err(|e| SchemaError::Compile(e.to_string()))?;

    let mut errors: HashMap<String, Vec<String>> = HashMap::new();
    for error in validator.iter_errors(document) {
        let field = pointer_to_dotted(&error.instance_path.to_string());
        errors.entry(field).or_default().push(error.to_string());
    }

    Ok(ValidationReport { errors })
}

/// Converts a JSON-pointer path (`/data/0/id`) into the dotted form the
/// spec's examples use (`data.0.id`). The root pointer (`""`) maps to `""`.
fn pointer_to_dotted(pointer: &str) -> String {
    pointer
        .trim_start_matches('/')
        .replace('/', ".")
        .replace("~1", "/")
        .replace("~0", "~")
}
