//! Runtime registry for the tools the gateway exposes to the agent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject, Tool};
use thiserror::Error;

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors produced by tool registration and dispatch.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Tool name collided with an existing registration.
    #[error("tool `{name}` is already registered")]
    DuplicateTool {
        /// Name of the offending tool.
        name: String,
    },

    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },
}

/// Trait implemented by tool executors.
///
/// Handlers never fail at the transport level: anything that goes wrong is
/// reported inside the returned [`CallToolResult`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with the parsed argument object.
    async fn call(&self, arguments: JsonObject) -> CallToolResult;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Send + Sync + Fn(JsonObject) -> Fut,
    Fut: Future<Output = CallToolResult> + Send,
{
    async fn call(&self, arguments: JsonObject) -> CallToolResult {
        (self)(arguments).await
    }
}

/// Handle pairing a tool's advertised specification with its executor.
#[derive(Clone)]
pub struct ToolHandle {
    spec: Tool,
    handler: Arc<dyn ToolHandler>,
}

impl ToolHandle {
    /// The specification advertised in tool listings.
    #[must_use]
    pub fn spec(&self) -> &Tool {
        &self.spec
    }

    /// Executes the underlying tool implementation.
    pub async fn call(&self, arguments: JsonObject) -> CallToolResult {
        self.handler.call(arguments).await
    }
}

#[derive(Default)]
struct Inner {
    handles: HashMap<String, ToolHandle>,
    order: Vec<String>,
}

/// Registry that stores tool implementations keyed by name.
///
/// Listings preserve registration order so built-in tools come before saved
/// and proxied ones.
#[derive(Default)]
pub struct ToolRegistry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().expect("tool registry poisoned");
        f.debug_struct("ToolRegistry")
            .field("registered", &inner.order)
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool implementation under its advertised name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateTool`] if the name is already
    /// present.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    pub fn register_tool<H>(&self, spec: Tool, handler: H) -> RegistryResult<()>
    where
        H: ToolHandler + 'static,
    {
        let mut inner = self.inner.write().expect("tool registry poisoned");
        let name = spec.name.to_string();
        if inner.handles.contains_key(&name) {
            return Err(RegistryError::DuplicateTool { name });
        }

        inner.order.push(name.clone());
        inner.handles.insert(
            name,
            ToolHandle {
                spec,
                handler: Arc::new(handler),
            },
        );

        Ok(())
    }

    /// Returns a handle to the tool matching the supplied name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolHandle> {
        let inner = self.inner.read().ok()?;
        inner.handles.get(name).cloned()
    }

    /// Invokes a registered tool directly.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownTool`] when the tool is not found.
    pub async fn call(&self, name: &str, arguments: JsonObject) -> RegistryResult<CallToolResult> {
        let handle = self.get(name).ok_or_else(|| RegistryError::UnknownTool {
            name: name.to_owned(),
        })?;
        Ok(handle.call(arguments).await)
    }

    /// Lists the specifications of all registered tools in registration order.
    ///
    /// # Panics
    ///
    /// Panics if the internal registry lock is poisoned.
    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        let inner = self.inner.read().expect("tool registry poisoned");
        inner
            .order
            .iter()
            .filter_map(|name| inner.handles.get(name))
            .map(|handle| handle.spec.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rmcp::model::Content;

    fn spec(name: &str) -> Tool {
        Tool::new(
            name.to_owned(),
            "echoes its arguments".to_owned(),
            Arc::new(JsonObject::new()),
        )
    }

    fn echo(arguments: JsonObject) -> impl Future<Output = CallToolResult> + Send {
        async move {
            let rendered = serde_json::Value::Object(arguments).to_string();
            CallToolResult::success(vec![Content::text(rendered)])
        }
    }

    #[tokio::test]
    async fn register_and_invoke_tool() {
        let registry = ToolRegistry::new();
        registry.register_tool(spec("echo"), echo).unwrap();

        let mut arguments = JsonObject::new();
        arguments.insert("message".to_owned(), serde_json::json!("hello"));

        let result = registry.call("echo", arguments).await.unwrap();
        assert_eq!(result.is_error, Some(false));
    }

    #[tokio::test]
    async fn duplicate_registration_errors() {
        let registry = ToolRegistry::new();
        registry.register_tool(spec("echo"), echo).unwrap();

        let err = registry
            .register_tool(spec("echo"), echo)
            .expect_err("duplicate registration should fail");
        assert!(matches!(err, RegistryError::DuplicateTool { name } if name == "echo"));
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = ToolRegistry::new();
        let err = registry
            .call("missing", JsonObject::new())
            .await
            .expect_err("unknown tool should error");
        assert!(matches!(err, RegistryError::UnknownTool { name } if name == "missing"));
    }

    #[tokio::test]
    async fn listing_preserves_registration_order() {
        let registry = ToolRegistry::new();
        registry.register_tool(spec("first"), echo).unwrap();
        registry.register_tool(spec("second"), echo).unwrap();

        let names: Vec<String> = registry
            .list()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        assert_eq!(names, ["first", "second"]);
    }
}
