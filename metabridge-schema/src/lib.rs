//! Schema handling for metabridge tools.
//!
//! Upstream servers frequently declare parameter schemas against JSON Schema
//! draft-07 while the agent-facing protocol expects draft 2020-12. This crate
//! rewrites the dialect marker recursively and validates tool arguments
//! against declared schemas, keeping "the schema is broken" distinct from
//! "the arguments do not conform".

#![warn(missing_docs, clippy::pedantic)]

mod normalize;
mod validate;

pub use normalize::{normalize, safe_normalize, NormalizeError};
pub use validate::{validate_params, ValidationFailure};
