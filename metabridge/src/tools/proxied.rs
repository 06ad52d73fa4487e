//! Re-exposing filtered upstream tools under prefixed names.

use std::sync::Arc;

use rmcp::model::{CallToolResult, JsonObject, Tool};
use tracing::{debug, info, warn};

use metabridge_config::{Config, HIDE_PROXIED_TOOLS_ENV};
use metabridge_proxy::ProxyManager;

use crate::registry::ToolRegistry;
use crate::tools::error_response;

/// Registers every discovered upstream tool the configuration exposes.
///
/// Tools are surfaced as `server__tool` with a `[server] description`
/// prefix. Hidden servers, filtered tool names, and the global opt-out all
/// suppress exposure; bridged access from inside scripts is unaffected.
///
/// # Errors
///
/// Fails when a prefixed name collides with an existing registration.
pub fn register_proxied_tools(
    registry: &ToolRegistry,
    proxy: &Arc<dyn ProxyManager>,
    config: &Config,
) -> crate::registry::RegistryResult<()> {
    if metabridge_config::should_hide_proxied_tools() {
        info!("proxied tools are hidden via {HIDE_PROXIED_TOOLS_ENV}");
        return Ok(());
    }

    let all_tools = proxy.get_all_capabilities();
    let mut registered = 0usize;

    for (server_name, tools) in &all_tools {
        let Some(server_config) = config.mcp_servers.get(server_name) else {
            warn!(server = %server_name, "no configuration found for server, skipping tools");
            continue;
        };

        if server_config.hidden {
            debug!(server = %server_name, "skipping tools from hidden server");
            continue;
        }

        for tool in tools {
            if !server_config.should_include_tool(&tool.name) {
                debug!(server = %server_name, tool = %tool.name, "filtered out tool");
                continue;
            }

            let prefixed = format!("{server_name}__{}", tool.name);
            let description = format!("[{server_name}] {}", tool.description);
            // A failed rewrite registers the tool schemaless (accept-anything).
            let schema = metabridge_schema::safe_normalize(&tool.input_schema, &tool.name)
                .unwrap_or_default();

            let spec = Tool::new(prefixed, description, Arc::new(schema));
            let proxy = Arc::clone(proxy);
            let server_name = server_name.clone();
            let tool_name = tool.name.clone();

            registry.register_tool(spec, move |arguments: JsonObject| {
                let proxy = Arc::clone(&proxy);
                let server_name = server_name.clone();
                let tool_name = tool_name.clone();
                async move { forward_call(&proxy, &server_name, &tool_name, arguments).await }
            })?;
            registered += 1;
        }
    }

    info!(registered, servers = all_tools.len(), "registered proxied tools");
    Ok(())
}

async fn forward_call(
    proxy: &Arc<dyn ProxyManager>,
    server_name: &str,
    tool_name: &str,
    arguments: JsonObject,
) -> CallToolResult {
    match proxy.call_capability(server_name, tool_name, arguments).await {
        Ok(upstream) => {
            let mut result = CallToolResult::success(upstream.content);
            result.structured_content = upstream.structured_content;
            result.is_error = Some(upstream.is_error);
            result
        }
        Err(err) => error_response(format!("Proxied tool call failed: {err}")),
    }
}
