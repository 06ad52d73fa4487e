//! Argument validation against declared parameter schemas.

use serde_json::{Map, Value};
use thiserror::Error;

/// Reasons a tool invocation's arguments can be rejected.
///
/// The two variants are deliberately distinct: a broken schema document is
/// the tool author's problem, non-conforming arguments are the caller's.
#[derive(Debug, Error)]
pub enum ValidationFailure {
    /// The schema document itself is malformed.
    #[error("invalid JSON schema definition: {reason}")]
    Schema {
        /// Human-readable description of the schema defect.
        reason: String,
    },

    /// The arguments do not conform to a well-formed schema.
    #[error("parameter validation failed: {reason}")]
    Arguments {
        /// Human-readable description of each violation.
        reason: String,
    },
}

/// Validates an argument map against a parameter schema.
///
/// An empty schema accepts any arguments.
///
/// # Errors
///
/// Returns [`ValidationFailure::Schema`] when the schema document is
/// malformed and [`ValidationFailure::Arguments`] when the arguments do not
/// conform.
pub fn validate_params(
    schema: &Map<String, Value>,
    params: &Map<String, Value>,
) -> Result<(), ValidationFailure> {
    if schema.is_empty() {
        return Ok(());
    }

    let schema_value = Value::Object(schema.clone());
    let validator =
        jsonschema::validator_for(&schema_value).map_err(|err| ValidationFailure::Schema {
            reason: err.to_string(),
        })?;

    let instance = Value::Object(params.clone());
    let violations: Vec<String> = validator
        .iter_errors(&instance)
        .map(|err| err.to_string())
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure::Arguments {
            reason: violations.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn name_required() -> Map<String, Value> {
        as_map(json!({
            "type": "object",
            "properties": { "name": { "type": "string" } },
            "required": ["name"]
        }))
    }

    #[test]
    fn empty_schema_accepts_anything() {
        let params = as_map(json!({ "whatever": [1, 2, 3] }));
        validate_params(&Map::new(), &params).expect("empty schema accepts all");
    }

    #[test]
    fn missing_required_property_is_an_argument_error() {
        let err = validate_params(&name_required(), &Map::new())
            .expect_err("missing required property");
        assert!(matches!(err, ValidationFailure::Arguments { .. }));
    }

    #[test]
    fn conforming_arguments_pass() {
        let params = as_map(json!({ "name": "x" }));
        validate_params(&name_required(), &params).expect("conforming arguments");
    }

    #[test]
    fn wrong_type_is_an_argument_error() {
        let params = as_map(json!({ "name": 42 }));
        let err = validate_params(&name_required(), &params).expect_err("wrong type");
        assert!(matches!(err, ValidationFailure::Arguments { .. }));
    }

    #[test]
    fn malformed_schema_is_a_schema_error() {
        let schema = as_map(json!({ "type": 17 }));
        let params = as_map(json!({ "name": "x" }));

        let err = validate_params(&schema, &params).expect_err("malformed schema");
        assert!(matches!(err, ValidationFailure::Schema { .. }));
    }
}
