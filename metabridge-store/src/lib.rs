//! On-disk persistence for saved tool definitions.
//!
//! Saved tools live as one pretty-printed JSON document per tool under the
//! metabridge tools directory. Tool names double as file names, so they are
//! validated against filesystem-unsafe characters before anything touches
//! disk.

#![warn(missing_docs, clippy::pedantic)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::fs;
use tracing::warn;

/// Convenient result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by the tool store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying filesystem failure.
    #[error("tool storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A definition could not be serialized or parsed.
    #[error("tool definition serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The tool name is unusable as a file name.
    #[error("invalid tool name: {reason}")]
    InvalidName {
        /// Why the name was rejected.
        reason: String,
    },

    /// No saved tool exists under the requested name.
    #[error("tool '{name}' does not exist")]
    NotFound {
        /// The name that was looked up.
        name: String,
    },
}

/// A composite tool definition as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedToolDefinition {
    /// Name the tool is registered under.
    pub name: String,
    /// Human-readable description shown to agents.
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's parameters.
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Map<String, Value>,
    /// The Starlark source executed when the tool is called.
    pub code: String,
}

/// Rejects names that would escape or corrupt the tools directory.
///
/// # Errors
///
/// Returns [`StoreError::InvalidName`] for empty names, names over 100
/// characters, and names containing filesystem-unsafe sequences.
pub fn validate_tool_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidName {
            reason: "tool name cannot be empty".to_owned(),
        });
    }
    if name.len() > 100 {
        return Err(StoreError::InvalidName {
            reason: "tool name too long (max 100 characters)".to_owned(),
        });
    }

    const UNSAFE: &[&str] = &["/", "\\", ":", "*", "?", "\"", "<", ">", "|", "..", " "];
    for sequence in UNSAFE {
        if name.contains(sequence) {
            return Err(StoreError::InvalidName {
                reason: format!("tool name contains invalid character: {sequence}"),
            });
        }
    }

    Ok(())
}

/// A directory of saved tool definitions.
pub struct ToolStore {
    dir: PathBuf,
}

impl ToolStore {
    /// A store rooted at an explicit directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A store rooted at the default metabridge tools directory.
    ///
    /// # Errors
    ///
    /// Fails when the directory cannot be resolved or created.
    pub fn open_default() -> StoreResult<Self> {
        Ok(Self::new(metabridge_config::paths::tools_dir()?))
    }

    /// The directory definitions are stored in.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn tool_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Writes a definition to disk, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Fails on invalid names and filesystem or serialization errors.
    pub async fn save(&self, tool: &SavedToolDefinition) -> StoreResult<()> {
        validate_tool_name(&tool.name)?;

        fs::create_dir_all(&self.dir).await?;
        let document = serde_json::to_vec_pretty(tool)?;
        fs::write(self.tool_path(&tool.name), document).await?;
        Ok(())
    }

    /// Reads one definition by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such tool is saved, and
    /// filesystem or parse errors otherwise.
    pub async fn load(&self, name: &str) -> StoreResult<SavedToolDefinition> {
        validate_tool_name(name)?;

        let data = match fs::read(self.tool_path(name)).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound {
                    name: name.to_owned(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        Ok(serde_json::from_slice(&data)?)
    }

    /// Lists every readable definition in the store.
    ///
    /// Malformed files are skipped with a warning so one broken definition
    /// does not hide the rest. A missing directory reads as an empty store.
    ///
    /// # Errors
    ///
    /// Fails only on filesystem errors other than a missing directory.
    pub async fn list(&self) -> StoreResult<Vec<SavedToolDefinition>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut tools = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }

            match fs::read(&path).await {
                Ok(data) => match serde_json::from_slice::<SavedToolDefinition>(&data) {
                    Ok(tool) => tools.push(tool),
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping malformed tool definition");
                    }
                },
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable tool definition");
                }
            }
        }

        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    /// Removes a definition from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such tool is saved.
    pub async fn delete(&self, name: &str) -> StoreResult<()> {
        validate_tool_name(name)?;

        match fs::remove_file(self.tool_path(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
                name: name.to_owned(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn sample(name: &str) -> SavedToolDefinition {
        let schema = match json!({
            "type": "object",
            "properties": { "n": { "type": "number" } }
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        SavedToolDefinition {
            name: name.to_owned(),
            description: "doubles a number".to_owned(),
            input_schema: schema,
            code: "result = params[\"n\"] * 2".to_owned(),
        }
    }

    #[tokio::test]
    async fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path());

        let tool = sample("double");
        store.save(&tool).await.expect("save");

        let loaded = store.load("double").await.expect("load");
        assert_eq!(loaded, tool);
    }

    #[tokio::test]
    async fn listing_skips_malformed_files() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path());

        store.save(&sample("alpha")).await.expect("save alpha");
        store.save(&sample("beta")).await.expect("save beta");
        tokio::fs::write(tmp.path().join("broken.json"), b"{ not json")
            .await
            .expect("write broken");
        tokio::fs::write(tmp.path().join("notes.txt"), b"ignored")
            .await
            .expect("write notes");

        let tools = store.list().await.expect("list");
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn missing_directory_reads_as_empty() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path().join("nonexistent"));
        assert!(store.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn deleting_a_missing_tool_is_an_error() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path());

        let err = store.delete("ghost").await.expect_err("missing tool");
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unsafe_names_are_rejected() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let store = ToolStore::new(tmp.path());

        for name in ["", "../escape", "with space", "a:b", &"x".repeat(101)] {
            let mut tool = sample("ok");
            tool.name = (*name).to_owned();
            let err = store.save(&tool).await.expect_err("invalid name");
            assert!(matches!(err, StoreError::InvalidName { .. }), "{name}");
        }
    }
}
