//! The `eval_starlark` built-in tool.

use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use metabridge_sandbox::Executor;

use crate::registry::{RegistryResult, ToolRegistry};
use crate::tools::{error_response, success_response, with_structured};

#[derive(Deserialize)]
struct EvalStarlarkArgs {
    code: String,
    #[serde(default)]
    params: Option<JsonObject>,
}

fn eval_schema() -> JsonObject {
    match serde_json::json!({
        "type": "object",
        "properties": {
            "code": {
                "type": "string",
                "description": "The Starlark code to execute"
            },
            "params": {
                "type": "object",
                "description": "Optional parameters made available to the script as `params`"
            }
        },
        "required": ["code"]
    }) {
        Value::Object(schema) => schema,
        _ => JsonObject::new(),
    }
}

/// Registers the `eval_starlark` tool.
///
/// # Errors
///
/// Returns [`crate::registry::RegistryError::DuplicateTool`] if the name is
/// taken.
pub fn register_eval_starlark(
    registry: &ToolRegistry,
    executor: Arc<Executor>,
) -> RegistryResult<()> {
    let spec = Tool::new(
        "eval_starlark",
        "Execute Starlark code and return the result",
        Arc::new(eval_schema()),
    );

    registry.register_tool(spec, move |arguments: JsonObject| {
        let executor = Arc::clone(&executor);
        async move {
            let EvalStarlarkArgs { code, params } =
                match serde_json::from_value(Value::Object(arguments)) {
                    Ok(args) => args,
                    Err(err) => return error_response(format!("Invalid arguments: {err}")),
                };

            // Starlark evaluation is blocking and may itself block on
            // bridged upstream calls, so it must leave the async workers.
            let joined = tokio::task::spawn_blocking(move || {
                executor.execute(&code, params.as_ref())
            })
            .await;

            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(err) => return error_response(format!("Execution failed: {err}")),
            };

            if let Some(error) = &outcome.error {
                return error_response(format!("Starlark Error: {error}"));
            }

            let result = outcome.result.clone().unwrap_or(Value::Null);
            let rendered = success_response(format!("Result: {result}"));
            match serde_json::to_value(&outcome) {
                Ok(structured) => with_structured(rendered, structured),
                Err(err) => {
                    warn!(error = %err, "failed to serialize execution outcome");
                    rendered
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn registry_with_eval() -> ToolRegistry {
        let registry = ToolRegistry::new();
        register_eval_starlark(&registry, Arc::new(Executor::new())).unwrap();
        registry
    }

    fn arguments(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn evaluates_expression_with_params() {
        let registry = registry_with_eval();
        let result = registry
            .call(
                "eval_starlark",
                arguments(json!({ "code": "params[\"n\"] + 1", "params": { "n": 41 } })),
            )
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content, Some(json!({ "result": 42 })));
    }

    #[tokio::test]
    async fn script_failures_are_tool_errors_not_transport_errors() {
        let registry = registry_with_eval();
        let result = registry
            .call("eval_starlark", arguments(json!({ "code": "undefined_name" })))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn missing_code_argument_is_rejected() {
        let registry = registry_with_eval();
        let result = registry
            .call("eval_starlark", arguments(json!({ "params": {} })))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(true));
    }
}
