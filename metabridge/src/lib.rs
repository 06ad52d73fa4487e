//! The metabridge gateway binary and its agent-facing tool surface.
//!
//! The gateway speaks MCP over stdio to the agent. It exposes the built-in
//! `eval_starlark` and saved-tool management tools, re-registers saved
//! composite tools from disk, and re-exposes filtered upstream tools behind
//! `server__tool` prefixed names.

#![warn(missing_docs, clippy::pedantic)]

pub mod list;
pub mod registry;
pub mod server;
pub mod tools;
