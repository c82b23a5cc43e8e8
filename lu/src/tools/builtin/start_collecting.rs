//! Start collecting tool - opens a private preference chat with every member

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tools::{Tool, ToolContext, ToolResult};

pub struct StartCollectingTool;

#[async_trait]
impl Tool for StartCollectingTool {
    fn name(&self) -> &'static str {
        "start_collecting"
    }

    fn description(&self) -> &'static str {
        "Start collecting preferences from every group member over private messages. \
         Call this after reacting in the group; the private chats run on their own."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(group = %ctx.group.name, "StartCollectingTool::execute: called");
        info!("Starting preference collection for {}", ctx.group.name);
        match ctx.engine.open_collection_round(ctx, None).await {
            Ok(members) => ToolResult::success(json!({ "success": true, "members": members })),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}
