//! Starlark execution engine for metabridge.
//!
//! Scripts run in a hermetic [starlark] interpreter with no filesystem,
//! network, or clock access of their own. Everything a script can reach is
//! injected explicitly: a `params` dict, per-server namespaces bridging back
//! to proxied tools, and a small standard library (`json`, `math`, `time`).
//!
//! Evaluation is synchronous and CPU-bound; callers on an async runtime
//! should run [`Executor::execute`] inside `spawn_blocking`.

#![warn(missing_docs, clippy::pedantic)]

mod bridge;
mod convert;
mod executor;
mod stdlib;

pub use bridge::normalize_server_name;
pub use convert::{json_to_starlark, starlark_to_json};
pub use executor::{ExecutionOutcome, Executor};
