//! Get group memory tool - history for personalised suggestions

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub struct GetGroupMemoryTool;

impl GetGroupMemoryTool {
    async fn run(&self, ctx: &ToolContext) -> Result<Value, ToolError> {
        let member = ctx.require_member()?;
        let memory = ctx.engine.recall(&ctx.group.chat_id, &member.contact).await;
        Ok(json!(memory))
    }
}

#[async_trait]
impl Tool for GetGroupMemoryTool {
    fn name(&self) -> &'static str {
        "get_group_memory"
    }

    fn description(&self) -> &'static str {
        "Look up what this group usually does, what they have never tried, and what this person tends to pick."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(group = %ctx.group.name, "GetGroupMemoryTool::execute: called");
        self.run(ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_empty_history() {
        let h = Harness::new().await;
        let result = GetGroupMemoryTool.execute(json!({}), &h.direct_ctx("+1")).await.json();
        assert_eq!(result["has_history"], false);
        assert_eq!(result["total_hangouts"], 0);
    }

    #[tokio::test]
    async fn test_reflects_logged_hangouts() {
        let h = Harness::new().await;
        h.memory.record_hangout("chat42", "Roommates", "sushi dinner").await.unwrap();

        let result = GetGroupMemoryTool.execute(json!({}), &h.direct_ctx("+1")).await.json();
        assert_eq!(result["has_history"], true);
        assert_eq!(result["total_hangouts"], 1);
        assert_eq!(result["last_hangout"]["category"], "food");
    }
}
