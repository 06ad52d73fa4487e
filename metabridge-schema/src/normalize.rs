//! Draft-07 to draft 2020-12 dialect rewriting.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

const DRAFT_07: &str = "http://json-schema.org/draft-07/schema#";
const DRAFT_07_BARE: &str = "http://json-schema.org/draft-07/schema";
const DRAFT_2020_12: &str = "https://json-schema.org/draft/2020-12/schema";

/// Recursion limit guarding against pathological self-nested schemas.
const MAX_DEPTH: usize = 128;

/// Error returned when a schema cannot be normalized.
#[derive(Debug, Error)]
#[error("schema nesting exceeds {MAX_DEPTH} levels")]
pub struct NormalizeError;

/// Rewrites draft-07 `$schema` markers to draft 2020-12.
///
/// The rewrite recurses through `properties`, `items`, and
/// `additionalProperties` subschemas; all other schema content is left
/// untouched.
///
/// # Errors
///
/// Fails when the schema nests deeper than an internal recursion limit.
/// Callers wanting graceful degradation should use [`safe_normalize`].
pub fn normalize(schema: &Map<String, Value>) -> Result<Map<String, Value>, NormalizeError> {
    normalize_at(schema, 0)
}

/// Rewrites the dialect marker, degrading to `None` on failure.
///
/// A `None` return means the tool should be registered without a schema
/// (accept-anything) rather than failing registration; a warning is logged
/// with the provided context.
#[must_use]
pub fn safe_normalize(schema: &Map<String, Value>, context: &str) -> Option<Map<String, Value>> {
    match normalize_at(schema, 0) {
        Ok(normalized) => Some(normalized),
        Err(err) => {
            warn!(
                context = %context,
                error = %err,
                "schema normalization failed, proceeding without schema validation"
            );
            None
        }
    }
}

fn normalize_at(schema: &Map<String, Value>, depth: usize) -> Result<Map<String, Value>, NormalizeError> {
    if depth > MAX_DEPTH {
        return Err(NormalizeError);
    }

    let mut normalized = schema.clone();

    if let Some(Value::String(marker)) = schema.get("$schema") {
        if marker == DRAFT_07 || marker == DRAFT_07_BARE {
            normalized.insert(
                "$schema".to_owned(),
                Value::String(DRAFT_2020_12.to_owned()),
            );
        }
    }

    if let Some(Value::Object(properties)) = schema.get("properties") {
        let mut rewritten = Map::new();
        for (name, subschema) in properties {
            rewritten.insert(name.clone(), normalize_value(subschema, depth + 1)?);
        }
        normalized.insert("properties".to_owned(), Value::Object(rewritten));
    }

    if let Some(items) = schema.get("items") {
        normalized.insert("items".to_owned(), normalize_value(items, depth + 1)?);
    }

    if let Some(additional) = schema.get("additionalProperties") {
        normalized.insert(
            "additionalProperties".to_owned(),
            normalize_value(additional, depth + 1)?,
        );
    }

    Ok(normalized)
}

fn normalize_value(value: &Value, depth: usize) -> Result<Value, NormalizeError> {
    match value {
        Value::Object(subschema) => Ok(Value::Object(normalize_at(subschema, depth)?)),
        // Boolean schemas and malformed entries pass through unchanged.
        other => Ok(other.clone()),
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

    #[test]
    fn rewrites_top_level_marker() {
        let schema = as_map(json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object"
        }));

        let normalized = normalize(&schema).expect("normalize");
        assert_eq!(
            normalized["$schema"],
            json!("https://json-schema.org/draft/2020-12/schema")
        );
        assert_eq!(normalized["type"], json!("object"));
    }

    #[test]
    fn rewrites_bare_marker_without_fragment() {
        let schema = as_map(json!({ "$schema": "http://json-schema.org/draft-07/schema" }));
        let normalized = normalize(&schema).expect("normalize");
        assert_eq!(
            normalized["$schema"],
            json!("https://json-schema.org/draft/2020-12/schema")
        );
    }

    #[test]
    fn leaves_other_dialects_untouched() {
        let schema = as_map(json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "minimum": 3
        }));

        let normalized = normalize(&schema).expect("normalize");
        assert_eq!(Value::Object(normalized), Value::Object(schema));
    }

    #[test]
    fn recurses_through_nested_subschemas() {
        let schema = as_map(json!({
            "type": "object",
            "properties": {
                "tags": {
                    "$schema": "http://json-schema.org/draft-07/schema#",
                    "type": "array",
                    "items": {
                        "$schema": "http://json-schema.org/draft-07/schema#",
                        "type": "string"
                    }
                }
            },
            "additionalProperties": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "number"
            }
        }));

        let normalized = normalize(&schema).expect("normalize");
        let modern = json!("https://json-schema.org/draft/2020-12/schema");
        assert_eq!(normalized["properties"]["tags"]["$schema"], modern);
        assert_eq!(normalized["properties"]["tags"]["items"]["$schema"], modern);
        assert_eq!(normalized["additionalProperties"]["$schema"], modern);
    }

    #[test]
    fn safe_normalize_degrades_on_pathological_nesting() {
        let mut schema = json!({ "type": "string" });
        for _ in 0..200 {
            schema = json!({ "items": schema });
        }

        assert!(safe_normalize(&as_map(schema), "deep_tool").is_none());
    }

    #[test]
    fn boolean_subschemas_pass_through() {
        let schema = as_map(json!({
            "type": "object",
            "additionalProperties": false
        }));

        let normalized = normalize(&schema).expect("normalize");
        assert_eq!(normalized["additionalProperties"], json!(false));
    }
}
