//! Tool system for the remote agents
//!
//! Tools are the only way the agents act: every message sent, every state
//! transition requested, and every memory lookup goes through one. Each
//! exchange gets a `ToolContext` scoped to its group (and member, for
//! private chats).

mod context;
mod error;
mod executor;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::{ToolExecutor, ToolProfile};
pub use traits::{Tool, ToolResult};

use serde_json::Value;

/// Required string argument
pub(crate) fn required_str<'a>(input: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or(ToolError::MissingParameter(name))
}

/// Optional non-empty string argument
pub(crate) fn optional_str<'a>(input: &'a Value, name: &str) -> Option<&'a str> {
    input
        .get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
}
