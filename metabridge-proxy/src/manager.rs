//! Concrete connection manager backed by subprocess stdio transports.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::RwLock;

use async_trait::async_trait;
use metabridge_config::{Config, ServerConfig};
use rmcp::model::{CallToolRequestParam, Content, RawContent};
use rmcp::service::RunningService;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{ProxyError, ProxyManager, ProxyResult};

type ClientService = RunningService<RoleClient, ()>;

/// A tool discovered on an upstream server.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    /// Tool name as declared by the upstream server.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Declared parameter schema (JSON Schema document).
    pub input_schema: Map<String, Value>,
}

impl ToolDescriptor {
    fn from_tool(tool: rmcp::model::Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool
                .description
                .map(|description| description.to_string())
                .unwrap_or_default(),
            input_schema: (*tool.input_schema).clone(),
        }
    }
}

/// Result of a forwarded upstream tool call.
#[derive(Debug, Clone)]
pub struct CapabilityCallResult {
    /// Content pieces returned by the upstream tool.
    pub content: Vec<Content>,
    /// Optional structured payload returned alongside the content.
    pub structured_content: Option<Value>,
    /// Whether the upstream flagged the result as an error.
    pub is_error: bool,
}

impl CapabilityCallResult {
    /// Renders each content piece as a string.
    ///
    /// Text content yields its text verbatim; any other content kind falls
    /// back to its JSON rendering.
    #[must_use]
    pub fn rendered_content(&self) -> Vec<String> {
        self.content
            .iter()
            .map(|content| match &content.raw {
                RawContent::Text(text) => text.text.clone(),
                other => serde_json::to_string(other).unwrap_or_else(|_| "<content>".to_owned()),
            })
            .collect()
    }
}

/// Behavioral options for the connection manager.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManagerOptions {
    quiet: bool,
}

impl ManagerOptions {
    /// Demotes connection lifecycle logging to debug level (for CLI use).
    #[must_use]
    pub const fn quiet() -> Self {
        Self { quiet: true }
    }

    /// Returns `true` when connection logging is demoted.
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        self.quiet
    }
}

#[derive(Default)]
struct Inner {
    services: HashMap<String, ClientService>,
    tools: HashMap<String, Vec<ToolDescriptor>>,
}

/// Manages live connections to every configured upstream server.
///
/// Partial connectivity is expected: servers that fail to launch or
/// handshake are logged and skipped, and the rest of the gateway operates
/// against whatever subset connected.
pub struct ConnectionManager {
    config: Config,
    options: ManagerOptions,
    cancel: CancellationToken,
    inner: RwLock<Inner>,
}

impl ConnectionManager {
    /// Creates a manager for the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_options(config, ManagerOptions::default())
    }

    /// Creates a manager with explicit options.
    #[must_use]
    pub fn with_options(config: Config, options: ManagerOptions) -> Self {
        Self {
            config,
            options,
            cancel: CancellationToken::new(),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Connects to every configured upstream server.
    ///
    /// Failures are logged per server and never abort startup; servers that
    /// fail are simply absent from the connected set.
    pub async fn start(&self) {
        for (name, server_config) in &self.config.mcp_servers {
            if let Err(err) = self.connect_server(name, server_config).await {
                if self.options.is_quiet() {
                    debug!(server = %name, error = %err, "failed to connect to server");
                } else {
                    warn!(server = %name, error = %err, "failed to connect to server");
                }
            }
        }
    }

    /// Cancels the shared scope, closes every connection, and resets state.
    ///
    /// Safe to call repeatedly and without a prior [`ConnectionManager::start`];
    /// shutdown failures are logged and otherwise ignored.
    pub async fn stop(&self) {
        self.cancel.cancel();

        let services: Vec<(String, ClientService)> = {
            let mut inner = self.inner.write().expect("connection state poisoned");
            inner.tools.clear();
            inner.services.drain().collect()
        };

        for (name, service) in services {
            if let Err(err) = service.cancel().await {
                warn!(server = %name, error = %err, "error closing session");
            }
        }
    }

    /// Returns the names of all currently connected servers.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn get_connected_server_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("connection state poisoned");
        inner.services.keys().cloned().collect()
    }

    async fn connect_server(&self, name: &str, server_config: &ServerConfig) -> ProxyResult<()> {
        let transport = TokioChildProcess::new(
            tokio::process::Command::new(&server_config.command).configure(|cmd| {
                cmd.args(&server_config.args);
                for (key, value) in &server_config.env {
                    cmd.env(key, value);
                }
                cmd.stderr(Stdio::inherit());
            }),
        )
        .map_err(|err| ProxyError::Launch {
            server: name.to_owned(),
            reason: err.to_string(),
        })?;

        let service = ().serve(transport).await.map_err(|err| ProxyError::Handshake {
            server: name.to_owned(),
            reason: err.to_string(),
        })?;

        // Discovery failure does not fail the connection.
        let tools = match service.list_all_tools().await {
            Ok(tools) => {
                let descriptors: Vec<ToolDescriptor> =
                    tools.into_iter().map(ToolDescriptor::from_tool).collect();
                for descriptor in &descriptors {
                    debug!(server = %name, tool = %descriptor.name, "discovered tool");
                }
                descriptors
            }
            Err(err) => {
                warn!(server = %name, error = %err, "failed to discover tools");
                Vec::new()
            }
        };

        if self.options.is_quiet() {
            debug!(server = %name, tools = tools.len(), "connected to MCP server");
        } else {
            info!(server = %name, tools = tools.len(), "connected to MCP server");
        }

        let mut inner = self.inner.write().expect("connection state poisoned");
        inner.tools.insert(name.to_owned(), tools);
        inner.services.insert(name.to_owned(), service);
        Ok(())
    }
}

#[async_trait]
impl ProxyManager for ConnectionManager {
    fn get_all_capabilities(&self) -> HashMap<String, Vec<ToolDescriptor>> {
        let inner = self.inner.read().expect("connection state poisoned");
        inner.tools.clone()
    }

    async fn call_capability(
        &self,
        server_name: &str,
        capability_name: &str,
        arguments: Map<String, Value>,
    ) -> ProxyResult<CapabilityCallResult> {
        if self.cancel.is_cancelled() {
            return Err(ProxyError::NotConnected {
                server: server_name.to_owned(),
            });
        }

        let peer = {
            let inner = self.inner.read().expect("connection state poisoned");
            let service = inner
                .services
                .get(server_name)
                .ok_or_else(|| ProxyError::NotConnected {
                    server: server_name.to_owned(),
                })?;
            service.peer().clone()
        };

        let result = peer
            .call_tool(CallToolRequestParam {
                name: capability_name.to_owned().into(),
                arguments: Some(arguments),
            })
            .await
            .map_err(|err| ProxyError::CallFailed {
                reason: err.to_string(),
            })?;

        Ok(CapabilityCallResult {
            content: result.content,
            structured_content: result.structured_content,
            is_error: result.is_error.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(server: &str, command: &str) -> Config {
        let mut config = Config::default();
        config.mcp_servers.insert(
            server.to_owned(),
            ServerConfig {
                command: command.to_owned(),
                ..ServerConfig::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn call_on_empty_manager_is_not_connected() {
        let manager = ConnectionManager::new(Config::default());
        let err = manager
            .call_capability("github", "get_me", Map::new())
            .await
            .expect_err("no servers connected");

        assert!(matches!(err, ProxyError::NotConnected { server } if server == "github"));
    }

    #[tokio::test]
    async fn failed_launch_leaves_server_absent() {
        let manager = ConnectionManager::new(config_with(
            "broken",
            "/nonexistent/metabridge-test-binary",
        ));
        manager.start().await;

        assert!(manager.get_connected_server_names().is_empty());
        assert!(manager.get_all_capabilities().is_empty());

        let err = manager
            .call_capability("broken", "anything", Map::new())
            .await
            .expect_err("broken server never connected");
        assert!(matches!(err, ProxyError::NotConnected { .. }));
    }

    #[tokio::test]
    async fn stop_is_idempotent_without_start() {
        let manager = ConnectionManager::new(Config::default());
        manager.stop().await;
        manager.stop().await;

        let err = manager
            .call_capability("any", "tool", Map::new())
            .await
            .expect_err("stopped manager rejects calls");
        assert!(matches!(err, ProxyError::NotConnected { .. }));
    }

    #[test]
    fn quiet_mode_defaults_off() {
        assert!(!ManagerOptions::default().is_quiet());
        assert!(ManagerOptions::quiet().is_quiet());
    }

    #[test]
    fn rendered_content_prefers_text() {
        let result = CapabilityCallResult {
            content: vec![Content::text("hello")],
            structured_content: None,
            is_error: false,
        };
        assert_eq!(result.rendered_content(), vec!["hello".to_owned()]);
    }
}
