//! Mapping of client outcomes onto MCP tool results.

use rmcp::model::{CallToolResult, ErrorData};
use serde_json::{Value, json};
use tuba_api::ApiError;

fn build_error_data(error: &ApiError, category: &str, context: Value, suggested_action: &str) -> Value {
    json!({
        "error_code": error.code(),
        "category": category,
        "message": error.to_string(),
        "context": context,
        "suggested_action": suggested_action,
    })
}

/// Convert a client outcome into the tool response.
///
/// Missing credentials and failed pass-through requests are reported as
/// regular structured results carrying an `error` key. Assembly failures are
/// rejected as invalid parameters; local write failures as internal errors.
pub fn tool_outcome(outcome: Result<Value, ApiError>) -> Result<CallToolResult, ErrorData> {
    match outcome {
        Ok(value) => Ok(CallToolResult::structured(value)),
        Err(error @ (ApiError::AuthenticationRequired | ApiError::RequestFailed { .. })) => {
            Ok(CallToolResult::structured(json!({ "error": error.to_string() })))
        }
        Err(error) => Err(error_data(&error)),
    }
}

fn error_data(error: &ApiError) -> ErrorData {
    match error {
        ApiError::FileAccess { path, .. } => ErrorData::invalid_params(
            error.to_string(),
            Some(build_error_data(
                error,
                "file_access",
                json!({ "path": path.display().to_string() }),
                "Check that every path in `files` exists and is readable by the server process.",
            )),
        ),
        ApiError::RemoteFetch { url, .. } => ErrorData::invalid_params(
            error.to_string(),
            Some(build_error_data(
                error,
                "remote_fetch",
                json!({ "url": url }),
                "Check that every URL in `file_urls` is reachable and returns a success status.",
            )),
        ),
        ApiError::InvalidContentType { field, content_type } => ErrorData::invalid_params(
            error.to_string(),
            Some(build_error_data(
                error,
                "validation",
                json!({ "field": field, "content_type": content_type }),
                "Use a MIME type such as 'image/png' or omit content_type.",
            )),
        ),
        ApiError::ResultWrite { path, .. } => ErrorData::internal_error(
            error.to_string(),
            Some(build_error_data(
                error,
                "filesystem",
                json!({ "path": path.display().to_string() }),
                "Make sure the result directory exists and is writable.",
            )),
        ),
        other => ErrorData::internal_error(other.to_string(), Some(build_error_data(other, "internal", Value::Null, "Retry the call."))),
    }
}
