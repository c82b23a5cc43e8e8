//! ToolExecutor - name-to-handler registry for one agent

use std::collections::HashMap;

use tracing::{debug, info, warn};

use super::builtin::{
    CheckLastHangoutTool, GetGroupMemoryTool, GetMemberAvailabilityTool, LogHangoutTool, RequestRescheduleTool,
    SendGroupMessageTool, SendReplyTool, StartCollectingTool, SubmitPreferencesTool, SuggestFallbackTool,
};
use super::{Tool, ToolContext, ToolResult};
use crate::llm::{ToolCall, ToolDefinition};

/// Which agent a tool set serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolProfile {
    /// The agent speaking in the group chat
    Group,
    /// The agent running a private preference chat
    Direct,
}

/// Manages tool execution for one agent
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    /// Create executor with the tools of a profile
    pub fn with_profile(profile: ToolProfile) -> Self {
        debug!(?profile, "ToolExecutor::with_profile: called");
        let mut executor = Self::empty();

        match profile {
            ToolProfile::Group => {
                executor.add_tool(Box::new(SendGroupMessageTool));
                executor.add_tool(Box::new(StartCollectingTool));
                executor.add_tool(Box::new(LogHangoutTool));
                executor.add_tool(Box::new(CheckLastHangoutTool));
                executor.add_tool(Box::new(GetMemberAvailabilityTool));
                executor.add_tool(Box::new(RequestRescheduleTool));
            }
            ToolProfile::Direct => {
                executor.add_tool(Box::new(SendReplyTool));
                executor.add_tool(Box::new(SubmitPreferencesTool));
                executor.add_tool(Box::new(GetGroupMemoryTool));
                executor.add_tool(Box::new(SuggestFallbackTool));
            }
        }

        executor
    }

    /// Create an empty executor (for testing)
    pub fn empty() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Add a tool to the executor
    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    /// Tool definitions for the remote assistant, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool call
    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        match self.tools.get(&tool_call.name) {
            Some(tool) => {
                info!("Tool call: {}({})", tool_call.name, tool_call.input);
                let result = tool.execute(tool_call.input.clone(), ctx).await;
                if result.is_error {
                    warn!(tool_name = %tool_call.name, content = %result.content, "Tool reported an error");
                }
                result
            }
            None => {
                warn!(tool_name = %tool_call.name, "Agent requested an unknown tool");
                ToolResult::error(format!("Unknown tool: {}", tool_call.name))
            }
        }
    }

    /// Execute tool calls in order; results keep the call ids
    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        debug!(count = %tool_calls.len(), "ToolExecutor::execute_all: called");
        let mut results = Vec::with_capacity(tool_calls.len());

        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }

        results
    }

    /// Check if a tool exists
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_profile() {
        let executor = ToolExecutor::with_profile(ToolProfile::Group);
        assert_eq!(
            executor.tool_names(),
            vec![
                "check_last_hangout",
                "get_member_availability",
                "log_hangout",
                "request_reschedule",
                "send_group_message",
                "start_collecting",
            ]
        );
        assert!(!executor.has_tool("send_reply"));
    }

    #[test]
    fn test_direct_profile() {
        let executor = ToolExecutor::with_profile(ToolProfile::Direct);
        assert_eq!(
            executor.tool_names(),
            vec!["get_group_memory", "send_reply", "submit_preferences", "suggest_fallback"]
        );
        assert!(!executor.has_tool("start_collecting"));
    }

    #[test]
    fn test_definitions_carry_schemas() {
        let executor = ToolExecutor::with_profile(ToolProfile::Direct);
        let definitions = executor.definitions();
        let submit = definitions.iter().find(|d| d.name == "submit_preferences").unwrap();
        assert_eq!(submit.input_schema["type"], "object");
        assert!(submit.input_schema["properties"]["availability"].is_object());
    }

    #[test]
    fn test_empty_executor() {
        let executor = ToolExecutor::empty();
        assert!(executor.tool_names().is_empty());
        assert!(executor.definitions().is_empty());
    }
}
