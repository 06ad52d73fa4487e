//! Configuration for the metabridge gateway.
//!
//! Parses the `servers.json` configuration file describing upstream MCP
//! servers, performs `${VAR}` environment-variable substitution on launch
//! commands, arguments, and environment overrides, and evaluates the
//! per-server tool filtering rules (hidden flag plus mutually exclusive
//! allow/deny glob lists).

#![warn(missing_docs, clippy::pedantic)]

pub mod paths;

use std::collections::HashMap;
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file `{path}`: {source}")]
    Io {
        /// Path that failed to load.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file was not valid JSON.
    #[error("failed to parse config JSON: {source}")]
    Parse {
        /// Underlying deserialization error.
        #[source]
        source: serde_json::Error,
    },

    /// The configuration declares no upstream servers.
    #[error("no MCP servers configured")]
    NoServers,

    /// A server entry has an empty launch command.
    #[error("server `{server}` has empty command")]
    EmptyCommand {
        /// Name of the offending server.
        server: String,
    },

    /// A server declares both an allow-list and a deny-list.
    #[error("server `{server}` cannot have both allowedTools and hiddenTools configured")]
    ConflictingFilters {
        /// Name of the offending server.
        server: String,
    },
}

/// Configuration for a single upstream MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Command used to launch the server process.
    pub command: String,
    /// Arguments passed to the launch command.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Environment variable overrides for the server process.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// When set, none of this server's tools are exposed to the agent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    /// Glob allow-list: when non-empty, only matching tools are exposed.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_tools: Vec<String>,
    /// Glob deny-list: matching tools are suppressed from exposure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_tools: Vec<String>,
}

impl ServerConfig {
    /// Decides whether a tool should be exposed to the agent.
    ///
    /// An allow-list, when present, wins: only matching tools are included.
    /// Otherwise a deny-list suppresses matching tools. With neither list
    /// configured every tool is included. Filtering only affects agent-facing
    /// exposure; bridged access from inside scripts is unaffected.
    #[must_use]
    pub fn should_include_tool(&self, tool_name: &str) -> bool {
        if !self.allowed_tools.is_empty() {
            return self
                .allowed_tools
                .iter()
                .any(|pattern| matches_pattern(tool_name, pattern));
        }

        if self
            .hidden_tools
            .iter()
            .any(|pattern| matches_pattern(tool_name, pattern))
        {
            return false;
        }

        true
    }
}

/// Full metabridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Upstream server configurations keyed by server name.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: HashMap<String, ServerConfig>,
}

impl Config {
    /// Loads and parses a configuration file, expanding `${VAR}` references.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read and
    /// [`ConfigError::Parse`] when it is not valid JSON.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config: Self =
            serde_json::from_str(&data).map_err(|source| ConfigError::Parse { source })?;
        config.expand_env_vars();
        Ok(config)
    }

    /// Loads the configuration from the default `servers.json` location.
    ///
    /// # Errors
    ///
    /// Propagates path resolution and [`Config::load`] errors.
    pub fn load_default() -> ConfigResult<Self> {
        let path = paths::config_path().map_err(|source| ConfigError::Io {
            path: "servers.json".to_owned(),
            source,
        })?;
        Self::load(path)
    }

    /// Checks the configuration for basic validity.
    ///
    /// # Errors
    ///
    /// Returns an error when no servers are configured, a server has an
    /// empty command, or a server declares both filter lists.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.mcp_servers.is_empty() {
            return Err(ConfigError::NoServers);
        }

        for (name, server) in &self.mcp_servers {
            if server.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand {
                    server: name.clone(),
                });
            }
            if !server.allowed_tools.is_empty() && !server.hidden_tools.is_empty() {
                return Err(ConfigError::ConflictingFilters {
                    server: name.clone(),
                });
            }
        }

        Ok(())
    }

    /// Expands `${VAR}` references in commands, arguments, and env values.
    fn expand_env_vars(&mut self) {
        for server in self.mcp_servers.values_mut() {
            server.command = expand_string(&server.command);
            for arg in &mut server.args {
                *arg = expand_string(arg);
            }
            for value in server.env.values_mut() {
                *value = expand_string(value);
            }
        }
    }
}

/// Expands `${VAR}` environment-variable references in a string.
///
/// Unset variables expand to the empty string. Unterminated `${` sequences
/// are left untouched.
#[must_use]
pub fn expand_string(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                output.push_str(&env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated reference, keep it verbatim.
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}

/// Checks whether a tool name matches a filter pattern.
///
/// A pattern without `*` must match exactly. A pattern with `*` matches with
/// each `*` standing for any sequence of characters, anchored at both ends.
#[must_use]
pub fn matches_pattern(tool_name: &str, pattern: &str) -> bool {
    if !pattern.contains('*') {
        return tool_name == pattern;
    }

    let segments: Vec<&str> = pattern.split('*').collect();
    let Some((first, middle_and_last)) = segments.split_first() else {
        return false;
    };
    let Some((last, middle)) = middle_and_last.split_last() else {
        return false;
    };

    let Some(mut rest) = tool_name.strip_prefix(first) else {
        return false;
    };

    for segment in middle {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(index) => rest = &rest[index + segment.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

/// Name of the environment variable that suppresses all proxied tool exposure.
pub const HIDE_PROXIED_TOOLS_ENV: &str = "METABRIDGE_HIDE_PROXIED_TOOLS";

/// Returns `true` when proxied tools should be hidden from the agent globally.
///
/// Bridged access from inside scripts remains available regardless.
#[must_use]
pub fn should_hide_proxied_tools() -> bool {
    env::var(HIDE_PROXIED_TOOLS_ENV).is_ok_and(|value| !value.is_empty())
}
