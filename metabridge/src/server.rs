//! The MCP server handler and gateway wiring.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::transport::stdio;
use rmcp::{ErrorData, ServerHandler, ServiceExt};
use tokio::runtime::Handle;
use tracing::{debug, info};

use metabridge_config::{Config, ConfigError};
use metabridge_proxy::{ConnectionManager, ProxyManager};
use metabridge_sandbox::Executor;
use metabridge_store::ToolStore;

use crate::registry::ToolRegistry;
use crate::tools;

const INSTRUCTIONS: &str = "metabridge proxies tools from upstream MCP servers and lets you \
compose them: use eval_starlark to run Starlark code that can call proxied tools as \
server.tool(...) functions, and save_tool to persist a composite tool for reuse.";

/// The agent-facing MCP server, dispatching calls through the tool registry.
pub struct MetabridgeServer {
    registry: Arc<ToolRegistry>,
}

impl MetabridgeServer {
    /// Creates a server over an already-populated registry.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

impl ServerHandler for MetabridgeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "metabridge".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                ..Default::default()
            },
            instructions: Some(INSTRUCTIONS.to_owned()),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: self.registry.list(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let arguments = request.arguments.unwrap_or_default();
        self.registry
            .call(&request.name, arguments)
            .await
            .map_err(|err| ErrorData::invalid_params(err.to_string(), None))
    }
}

/// Loads the default configuration, treating a missing file as empty.
///
/// # Errors
///
/// Fails on unreadable or invalid configuration.
pub fn load_config() -> anyhow::Result<Config> {
    match Config::load_default() {
        Ok(config) => {
            if !config.mcp_servers.is_empty() {
                config.validate()?;
            }
            Ok(config)
        }
        Err(ConfigError::Io { path, source })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            debug!(path = %path, "no server configuration found, running without upstream servers");
            Ok(Config::default())
        }
        Err(err) => Err(err.into()),
    }
}

/// Builds the full tool registry: built-ins, saved tools, proxied tools.
///
/// # Errors
///
/// Fails when the saved-tool listing cannot be read or a built-in name
/// collides.
pub async fn build_registry(
    config: &Config,
    proxy: Option<&Arc<dyn ProxyManager>>,
    store: &Arc<ToolStore>,
) -> anyhow::Result<Arc<ToolRegistry>> {
    let executor = Arc::new(match proxy {
        Some(proxy) => Executor::with_proxy(Arc::clone(proxy), Handle::current()),
        None => Executor::new(),
    });

    let registry = Arc::new(ToolRegistry::new());
    tools::register_eval_starlark(&registry, Arc::clone(&executor))?;
    tools::register_management_tools(&registry, Arc::clone(store))?;
    tools::register_saved_tools(&registry, store, &executor).await?;
    if let Some(proxy) = proxy {
        tools::register_proxied_tools(&registry, proxy, config)?;
    }

    Ok(registry)
}

/// Runs the gateway over stdio until the agent disconnects.
///
/// # Errors
///
/// Fails on configuration, storage, or transport setup errors. Upstream
/// connection failures are logged per server and never abort startup.
pub async fn run_stdio() -> anyhow::Result<()> {
    let config = load_config()?;

    let manager = Arc::new(ConnectionManager::new(config.clone()));
    manager.start().await;
    let proxy: Arc<dyn ProxyManager> = manager.clone();

    let store = Arc::new(ToolStore::open_default()?);
    let registry = build_registry(&config, Some(&proxy), &store).await?;

    info!(tools = registry.list().len(), "starting metabridge server");
    let service = MetabridgeServer::new(registry).serve(stdio()).await?;
    service.waiting().await?;

    manager.stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_advertises_tool_support() {
        let server = MetabridgeServer::new(Arc::new(ToolRegistry::new()));
        let info = server.get_info();

        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "metabridge");
        assert!(info.instructions.is_some());
    }

    #[tokio::test]
    async fn registry_without_proxy_still_has_builtins() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(ToolStore::new(tmp.path()));

        let registry = build_registry(&Config::default(), None, &store)
            .await
            .expect("registry");

        let names: Vec<String> = registry
            .list()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        assert_eq!(
            names,
            [
                "eval_starlark",
                "save_tool",
                "list_saved_tools",
                "show_saved_tool",
                "delete_saved_tool"
            ]
        );
    }
}
