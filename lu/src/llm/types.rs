//! Request/response types for remote agent conversations
//!
//! A conversation is an opaque server-side thread. Each turn either finishes
//! (terminal status) or stops with a batch of requested tool calls that must
//! be answered before the run can continue.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Opaque reference to a remote conversation thread
pub type ConversationHandle = String;

/// Which remote assistant a conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    /// Talks to the whole group chat
    Group,
    /// Runs a one-on-one preference conversation with a single member
    Direct,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group => write!(f, "group"),
            Self::Direct => write!(f, "direct"),
        }
    }
}

/// Run status reported with every agent response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// The run is paused until tool outputs are submitted
    RequiresAction,
    Completed,
    Failed,
    /// Any status string we do not recognise; treated as terminal
    Other(String),
}

impl RunStatus {
    /// Parse a wire status string (case-insensitive)
    pub fn parse(s: &str) -> Self {
        debug!(%s, "RunStatus::parse: called");
        match s.to_ascii_uppercase().as_str() {
            "REQUIRES_ACTION" => Self::RequiresAction,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only `RequiresAction` keeps a turn open
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::RequiresAction)
    }
}

/// A tool invocation requested by the agent
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Result of one tool invocation, keyed by the call id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// One agent response (to a turn or to a tool-output submission)
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Text content, if the agent produced any
    pub content: Option<String>,

    /// Run status
    pub status: RunStatus,

    /// Tool calls requested in this round
    pub tool_calls: Vec<ToolCall>,

    /// Run identifier used when submitting tool outputs
    pub turn_id: Option<String>,
}

impl AgentResponse {
    /// The agent is waiting for at least one tool result
    pub fn requires_action(&self) -> bool {
        self.status == RunStatus::RequiresAction && !self.tool_calls.is_empty()
    }

    /// Short preview of the content for logs
    pub fn preview(&self) -> String {
        match &self.content {
            Some(text) => text.chars().take(100).collect(),
            None => "(none)".to_string(),
        }
    }
}

/// Tool definition advertised to a remote assistant
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: serde_json::Value) -> Self {
        let name = name.into();
        let description = description.into();
        debug!(%name, "ToolDefinition::new: called");
        Self {
            name,
            description,
            input_schema,
        }
    }

    /// Convert to the function-calling schema used by assistant definitions
    pub fn to_function_schema(&self) -> serde_json::Value {
        debug!(%self.name, "ToolDefinition::to_function_schema: called");
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_status_parse() {
        assert_eq!(RunStatus::parse("REQUIRES_ACTION"), RunStatus::RequiresAction);
        assert_eq!(RunStatus::parse("requires_action"), RunStatus::RequiresAction);
        assert_eq!(RunStatus::parse("COMPLETED"), RunStatus::Completed);
        assert_eq!(RunStatus::parse("FAILED"), RunStatus::Failed);
        assert_eq!(RunStatus::parse("in_progress"), RunStatus::Other("IN_PROGRESS".to_string()));
    }

    #[test]
    fn test_only_requires_action_is_open() {
        assert!(!RunStatus::RequiresAction.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Other("CANCELLED".to_string()).is_terminal());
    }

    #[test]
    fn test_requires_action_needs_tool_calls() {
        let mut response = AgentResponse {
            content: None,
            status: RunStatus::RequiresAction,
            tool_calls: vec![],
            turn_id: Some("run-1".to_string()),
        };
        assert!(!response.requires_action());

        response.tool_calls.push(ToolCall {
            id: "call-1".to_string(),
            name: "send_reply".to_string(),
            input: serde_json::json!({"message": "hey"}),
        });
        assert!(response.requires_action());

        response.status = RunStatus::Completed;
        assert!(!response.requires_action());
    }

    #[test]
    fn test_function_schema_shape() {
        let def = ToolDefinition::new(
            "send_reply",
            "Send a DM",
            serde_json::json!({"type": "object", "properties": {}}),
        );
        let schema = def.to_function_schema();
        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "send_reply");
        assert_eq!(schema["function"]["parameters"]["type"], "object");
    }
}
