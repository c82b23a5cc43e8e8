//! Check last hangout tool

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

pub struct CheckLastHangoutTool;

#[async_trait]
impl Tool for CheckLastHangoutTool {
    fn name(&self) -> &'static str {
        "check_last_hangout"
    }

    fn description(&self) -> &'static str {
        "Check when the group last hung out, how many days ago that was, and their hangout streak."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(group = %ctx.group.name, "CheckLastHangoutTool::execute: called");
        let last = ctx.session.lock().await.last_hangout().cloned();
        let Some(last) = last else {
            return ToolResult::success(json!({
                "last_hangout": null,
                "message": "No hangouts recorded yet!"
            }));
        };

        let days_ago = (Utc::now() - last.timestamp).num_days();
        let mut result = json!({ "last_hangout": last, "days_ago": days_ago });
        if let Some(stats) = ctx.engine.hangout_stats(&ctx.group.chat_id).await {
            result["total_hangouts"] = json!(stats.total_hangouts);
            result["streak"] = json!(stats.streak);
        }
        ToolResult::success(result)
    }
}
