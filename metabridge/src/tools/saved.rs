//! Registration and execution of saved composite tools.

use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde_json::Value;
use tracing::{info, warn};

use metabridge_sandbox::Executor;
use metabridge_store::{SavedToolDefinition, ToolStore};

use crate::registry::ToolRegistry;
use crate::tools::{error_response, success_response, with_structured};

/// Loads every saved tool definition and registers it as a callable tool.
///
/// A definition whose name collides with an existing registration is skipped
/// with a warning rather than failing startup.
///
/// # Errors
///
/// Fails when the saved-tool listing itself cannot be read.
pub async fn register_saved_tools(
    registry: &ToolRegistry,
    store: &ToolStore,
    executor: &Arc<Executor>,
) -> anyhow::Result<()> {
    for definition in store.list().await? {
        let name = definition.name.clone();
        match register_saved_tool(registry, definition, Arc::clone(executor)) {
            Ok(()) => info!(tool = %name, "registered saved tool"),
            Err(err) => warn!(tool = %name, error = %err, "skipping saved tool"),
        }
    }
    Ok(())
}

fn register_saved_tool(
    registry: &ToolRegistry,
    definition: SavedToolDefinition,
    executor: Arc<Executor>,
) -> crate::registry::RegistryResult<()> {
    let spec = Tool::new(
        definition.name.clone(),
        definition.description.clone(),
        Arc::new(definition.input_schema.clone()),
    );
    let definition = Arc::new(definition);

    registry.register_tool(spec, move |arguments: JsonObject| {
        let definition = Arc::clone(&definition);
        let executor = Arc::clone(&executor);
        async move { run_saved_tool(&definition, arguments, executor).await }
    })
}

async fn run_saved_tool(
    definition: &SavedToolDefinition,
    arguments: JsonObject,
    executor: Arc<Executor>,
) -> CallToolResult {
    if let Err(err) = metabridge_schema::validate_params(&definition.input_schema, &arguments) {
        return error_response(err.to_string());
    }

    let code = definition.code.clone();
    let joined =
        tokio::task::spawn_blocking(move || executor.execute(&code, Some(&arguments))).await;

    let outcome = match joined {
        Ok(outcome) => outcome,
        Err(err) => return error_response(format!("Tool execution failed: {err}")),
    };

    if let Some(error) = &outcome.error {
        return error_response(format!("Tool error: {error}"));
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

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn definition() -> SavedToolDefinition {
        let schema = match json!({
            "type": "object",
            "properties": { "n": { "type": "number" } },
            "required": ["n"]
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        SavedToolDefinition {
            name: "double".to_owned(),
            description: "doubles a number".to_owned(),
            input_schema: schema,
            code: "doubled = params[\"n\"] * 2\nresult = doubled".to_owned(),
        }
    }

    async fn registry_with_saved_tool() -> ToolRegistry {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path());
        store.save(&definition()).await.expect("save");

        let registry = ToolRegistry::new();
        register_saved_tools(&registry, &store, &Arc::new(Executor::new()))
            .await
            .expect("register");
        registry
    }

    fn arguments(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn saved_tool_executes_with_validated_params() {
        let registry = registry_with_saved_tool().await;
        let result = registry
            .call("double", arguments(json!({ "n": 21 })))
            .await
            .unwrap();

        assert_eq!(result.is_error, Some(false));
        assert_eq!(result.structured_content, Some(json!({ "result": 42 })));
    }

    #[tokio::test]
    async fn nonconforming_params_are_rejected_before_execution() {
        let registry = registry_with_saved_tool().await;
        let result = registry.call("double", JsonObject::new()).await.unwrap();

        assert_eq!(result.is_error, Some(true));
    }
}
