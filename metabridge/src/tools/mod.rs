//! The agent-facing tool surface.
//!
//! Built-in tools (`eval_starlark` plus the saved-tool management calls),
//! saved composite tools loaded from disk, and filtered proxied tools from
//! upstream servers are all registered into one [`crate::registry::ToolRegistry`].

mod eval;
mod manage;
mod proxied;
mod response;
mod saved;

pub use eval::register_eval_starlark;
pub use manage::register_management_tools;
pub use proxied::register_proxied_tools;
pub use saved::register_saved_tools;

pub(crate) use response::{error_response, success_response, with_structured};
