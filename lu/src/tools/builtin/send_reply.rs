//! Send reply tool - the private-chat agent's voice

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolError, ToolResult, required_str};

pub struct SendReplyTool;

impl SendReplyTool {
    async fn run(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let message = required_str(input, "message")?;
        let member = ctx.require_member()?;
        ctx.engine.transport().send_direct_message(&member.contact, message).await?;
        Ok(json!({ "success": true }))
    }
}

#[async_trait]
impl Tool for SendReplyTool {
    fn name(&self) -> &'static str {
        "send_reply"
    }

    fn description(&self) -> &'static str {
        "Send a message to the person you are chatting with. This is the only way they see anything you say."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message to send"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SendReplyTool::execute: called");
        self.run(&input, ctx).await.into()
    }
}
