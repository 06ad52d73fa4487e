//! Saved-tool management tools: save, list, show, delete.

use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject, Tool};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use metabridge_store::{SavedToolDefinition, ToolStore};

use crate::registry::{RegistryResult, ToolRegistry};
use crate::tools::{error_response, success_response, with_structured};

#[derive(Deserialize, Default)]
#[serde(default)]
struct SaveToolArgs {
    name: String,
    description: String,
    #[serde(rename = "inputSchema")]
    input_schema: JsonObject,
    code: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct NamedToolArgs {
    name: String,
}

#[derive(Serialize)]
struct ToolSummary {
    name: String,
    description: String,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolSummary>,
}

fn object_schema(value: Value) -> JsonObject {
    match value {
        Value::Object(schema) => schema,
        _ => JsonObject::new(),
    }
}

fn save_tool_schema() -> JsonObject {
    object_schema(serde_json::json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Name the tool is saved and registered under" },
            "description": { "type": "string", "description": "Human-readable description shown to agents" },
            "inputSchema": { "type": "object", "description": "JSON Schema for the tool's parameters" },
            "code": { "type": "string", "description": "Starlark source executed when the tool is called" }
        },
        "required": ["name", "description", "code"]
    }))
}

fn named_tool_schema() -> JsonObject {
    object_schema(serde_json::json!({
        "type": "object",
        "properties": {
            "name": { "type": "string", "description": "Name of the saved tool" }
        },
        "required": ["name"]
    }))
}

fn empty_schema() -> JsonObject {
    object_schema(serde_json::json!({ "type": "object" }))
}

fn parse<T: serde::de::DeserializeOwned + Default>(arguments: JsonObject) -> T {
    serde_json::from_value(Value::Object(arguments)).unwrap_or_default()
}

/// Registers `save_tool`, `list_saved_tools`, `show_saved_tool`, and
/// `delete_saved_tool`.
///
/// # Errors
///
/// Returns [`crate::registry::RegistryError::DuplicateTool`] if any name is
/// taken.
pub fn register_management_tools(
    registry: &ToolRegistry,
    store: Arc<ToolStore>,
) -> RegistryResult<()> {
    {
        let store = Arc::clone(&store);
        registry.register_tool(
            Tool::new(
                "save_tool",
                "Create or update a composite tool definition",
                Arc::new(save_tool_schema()),
            ),
            move |arguments: JsonObject| {
                let store = Arc::clone(&store);
                async move { handle_save_tool(&store, parse(arguments)).await }
            },
        )?;
    }

    {
        let store = Arc::clone(&store);
        registry.register_tool(
            Tool::new(
                "list_saved_tools",
                "List all saved composite tool definitions",
                Arc::new(empty_schema()),
            ),
            move |_arguments: JsonObject| {
                let store = Arc::clone(&store);
                async move { handle_list_saved_tools(&store).await }
            },
        )?;
    }

    {
        let store = Arc::clone(&store);
        registry.register_tool(
            Tool::new(
                "show_saved_tool",
                "Show the complete definition of a saved tool",
                Arc::new(named_tool_schema()),
            ),
            move |arguments: JsonObject| {
                let store = Arc::clone(&store);
                async move { handle_show_saved_tool(&store, parse(arguments)).await }
            },
        )?;
    }

    registry.register_tool(
        Tool::new(
            "delete_saved_tool",
            "Delete a saved tool definition",
            Arc::new(named_tool_schema()),
        ),
        move |arguments: JsonObject| {
            let store = Arc::clone(&store);
            async move { handle_delete_saved_tool(&store, parse(arguments)).await }
        },
    )
}

async fn handle_save_tool(store: &ToolStore, args: SaveToolArgs) -> CallToolResult {
    if args.name.is_empty() {
        return error_response("Error: tool name is required");
    }
    if args.description.is_empty() {
        return error_response("Error: tool description is required");
    }
    if args.code.is_empty() {
        return error_response("Error: tool code is required");
    }

    let definition = SavedToolDefinition {
        name: args.name,
        description: args.description,
        input_schema: args.input_schema,
        code: args.code,
    };

    if let Err(err) = store.save(&definition).await {
        return error_response(format!("Failed to save tool: {err}"));
    }

    let rendered = success_response(format!("Tool '{}' saved successfully", definition.name));
    match serde_json::to_value(&definition) {
        Ok(structured) => with_structured(rendered, structured),
        Err(err) => {
            warn!(error = %err, "failed to serialize saved tool definition");
            rendered
        }
    }
}

async fn handle_list_saved_tools(store: &ToolStore) -> CallToolResult {
    let tools = match store.list().await {
        Ok(tools) => tools,
        Err(err) => return error_response(format!("Failed to list saved tools: {err}")),
    };

    let summaries: Vec<ToolSummary> = tools
        .into_iter()
        .map(|tool| ToolSummary {
            name: tool.name,
            description: tool.description,
        })
        .collect();

    let rendered = if summaries.is_empty() {
        success_response("No saved tools found")
    } else {
        let lines: Vec<String> = summaries
            .iter()
            .map(|tool| format!("• {}: {}", tool.name, tool.description))
            .collect();
        success_response(format!(
            "Found {} saved tool(s):\n\n{}",
            summaries.len(),
            lines.join("\n")
        ))
    };

    let response = ToolListResponse { tools: summaries };
    match serde_json::to_value(&response) {
        Ok(structured) => with_structured(rendered, structured),
        Err(err) => {
            warn!(error = %err, "failed to serialize tool list");
            rendered
        }
    }
}

async fn handle_show_saved_tool(store: &ToolStore, args: NamedToolArgs) -> CallToolResult {
    if args.name.is_empty() {
        return error_response("Error: tool name is required");
    }

    let definition = match store.load(&args.name).await {
        Ok(definition) => definition,
        Err(err) => {
            return error_response(format!("Failed to load tool '{}': {err}", args.name));
        }
    };

    let rendered = success_response(definition.code.clone());
    match serde_json::to_value(&definition) {
        Ok(structured) => with_structured(rendered, structured),
        Err(err) => {
            warn!(error = %err, "failed to serialize tool definition");
            rendered
        }
    }
}

async fn handle_delete_saved_tool(store: &ToolStore, args: NamedToolArgs) -> CallToolResult {
    if args.name.is_empty() {
        return error_response("Error: tool name is required");
    }

    if let Err(err) = store.delete(&args.name).await {
        return error_response(format!("Failed to delete tool '{}': {err}", args.name));
    }

    let rendered = success_response(format!(
        "Tool '{}' deleted successfully. Restart server to remove from available tools.",
        args.name
    ));
    with_structured(rendered, serde_json::json!({ "deleted": args.name }))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn arguments(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn registry_with_store(dir: &std::path::Path) -> ToolRegistry {
        let registry = ToolRegistry::new();
        register_management_tools(&registry, Arc::new(ToolStore::new(dir))).unwrap();
        registry
    }

    async fn save_sample(registry: &ToolRegistry, name: &str) -> CallToolResult {
        registry
            .call(
                "save_tool",
                arguments(json!({
                    "name": name,
                    "description": "sample tool",
                    "inputSchema": { "type": "object" },
                    "code": "result = 1"
                })),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn save_then_show_then_delete() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let registry = registry_with_store(tmp.path());

        let saved = save_sample(&registry, "sample").await;
        assert_eq!(saved.is_error, Some(false));

        let shown = registry
            .call("show_saved_tool", arguments(json!({ "name": "sample" })))
            .await
            .unwrap();
        assert_eq!(shown.is_error, Some(false));
        let structured = shown.structured_content.expect("definition");
        assert_eq!(structured["code"], json!("result = 1"));

        let deleted = registry
            .call("delete_saved_tool", arguments(json!({ "name": "sample" })))
            .await
            .unwrap();
        assert_eq!(deleted.is_error, Some(false));
        assert_eq!(
            deleted.structured_content,
            Some(json!({ "deleted": "sample" }))
        );

        let listed = registry
            .call("list_saved_tools", JsonObject::new())
            .await
            .unwrap();
        assert_eq!(listed.structured_content, Some(json!({ "tools": [] })));
    }

    #[tokio::test]
    async fn save_requires_name_description_and_code() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let registry = registry_with_store(tmp.path());

        for missing in [
            json!({ "description": "d", "code": "c" }),
            json!({ "name": "n", "code": "c" }),
            json!({ "name": "n", "description": "d" }),
        ] {
            let result = registry
                .call("save_tool", arguments(missing))
                .await
                .unwrap();
            assert_eq!(result.is_error, Some(true));
        }
    }

    #[tokio::test]
    async fn listing_renders_a_bulleted_summary() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let registry = registry_with_store(tmp.path());

        save_sample(&registry, "alpha").await;
        save_sample(&registry, "beta").await;

        let listed = registry
            .call("list_saved_tools", JsonObject::new())
            .await
            .unwrap();
        let structured = listed.structured_content.expect("summaries");
        assert_eq!(structured["tools"][0]["name"], json!("alpha"));
        assert_eq!(structured["tools"][1]["name"], json!("beta"));
    }

    #[tokio::test]
    async fn deleting_a_missing_tool_reports_an_error() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let registry = registry_with_store(tmp.path());

        let result = registry
            .call("delete_saved_tool", arguments(json!({ "name": "ghost" })))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
