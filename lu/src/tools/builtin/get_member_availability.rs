//! Get member availability tool

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::aggregate::availability_view;
use crate::tools::{Tool, ToolContext, ToolResult};

pub struct GetMemberAvailabilityTool;

#[async_trait]
impl Tool for GetMemberAvailabilityTool {
    fn name(&self) -> &'static str {
        "get_member_availability"
    }

    fn description(&self) -> &'static str {
        "Check the preferences collected so far in the current planning round."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(group = %ctx.group.name, "GetMemberAvailabilityTool::execute: called");
        let session = ctx.session.lock().await;
        let availability = availability_view(&ctx.group, session.event.agents());
        ToolResult::success(json!({ "availability": availability }))
    }
}
