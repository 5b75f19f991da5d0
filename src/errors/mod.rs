mod api_error;
mod mcp_error;
mod tool_error;

pub use api_error::{extract_upstream_message, parse_retry_after, ApiError, ApiErrorKind};
pub use mcp_error::{ErrorCode, McpError};
pub use tool_error::{ToolError, ToolErrorKind};
