//! Response helpers shared by every tool handler.

use rmcp::model::{CallToolResult, Content};
use serde_json::Value;

pub(crate) fn success_response(message: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(message.into())])
}

pub(crate) fn error_response(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

pub(crate) fn with_structured(mut result: CallToolResult, structured: Value) -> CallToolResult {
    result.structured_content = Some(structured);
    result
}
