//! Connection management for upstream MCP servers.
//!
//! The [`ConnectionManager`] owns one subprocess-backed MCP client session
//! per configured upstream server. It launches the processes, performs the
//! protocol handshake, discovers each server's tools, and forwards tool
//! calls while the rest of the gateway reads consistent snapshots through a
//! reader/writer lock.

#![warn(missing_docs, clippy::pedantic)]

mod manager;

pub use manager::{CapabilityCallResult, ConnectionManager, ManagerOptions, ToolDescriptor};

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Result alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Errors surfaced by the connection manager.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The target server has no live connection.
    #[error("server `{server}` not connected")]
    NotConnected {
        /// Name of the server the call targeted.
        server: String,
    },

    /// The upstream process could not be launched.
    #[error("failed to launch server `{server}`: {reason}")]
    Launch {
        /// Name of the server that failed to launch.
        server: String,
        /// Human-readable launch failure.
        reason: String,
    },

    /// The protocol handshake with an upstream server failed.
    #[error("failed to connect to server `{server}`: {reason}")]
    Handshake {
        /// Name of the server that failed the handshake.
        server: String,
        /// Human-readable handshake failure.
        reason: String,
    },

    /// A forwarded tool call failed in transport or upstream.
    #[error("tool call failed: {reason}")]
    CallFailed {
        /// Human-readable transport or upstream failure.
        reason: String,
    },
}

/// Read and call access to upstream capabilities.
///
/// The sandbox bridge and the agent-facing tool surface both consume this
/// trait rather than the concrete manager so tests can substitute fakes.
#[async_trait]
pub trait ProxyManager: Send + Sync {
    /// Returns a deep copy of every discovered tool, keyed by server name.
    fn get_all_capabilities(&self) -> HashMap<String, Vec<ToolDescriptor>>;

    /// Forwards a tool call to the named upstream server.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::NotConnected`] when the server has no live
    /// connection and [`ProxyError::CallFailed`] on transport failure.
    async fn call_capability(
        &self,
        server_name: &str,
        capability_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> ProxyResult<CapabilityCallResult>;
}
