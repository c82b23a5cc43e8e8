//! Tool trait and result type

use async_trait::async_trait;
use serde_json::{Value, json};

use super::ToolContext;

/// An operation the remote agents can invoke by name
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the agent calls the tool by
    fn name(&self) -> &'static str;

    /// Description shown to the agent
    fn description(&self) -> &'static str;

    /// JSON schema of the arguments
    fn input_schema(&self) -> Value;

    /// Run the tool. Failures are reported in the result, never raised.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}

/// Output of a tool call, handed back to the agent verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    /// JSON text
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    /// Successful result carrying `value` as JSON text
    pub fn success(value: Value) -> Self {
        Self {
            content: value.to_string(),
            is_error: false,
        }
    }

    /// `{"success": false, "error": message}`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: json!({ "success": false, "error": message.into() }).to_string(),
            is_error: true,
        }
    }

    /// Parse the content back into JSON
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.content).unwrap_or(Value::Null)
    }
}

impl From<Result<Value, super::ToolError>> for ToolResult {
    fn from(result: Result<Value, super::ToolError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(e) => Self::error(e.to_string()),
        }
    }
}
