//! Log hangout tool - records a hangout that already happened

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tools::{Tool, ToolContext, ToolError, ToolResult, optional_str};

pub struct LogHangoutTool;

impl LogHangoutTool {
    async fn run(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let description = optional_str(input, "description").unwrap_or("Hangout");

        let record = {
            let mut session = ctx.session.lock().await;
            session.log_hangout(description, Utc::now());
            session.last_hangout().cloned()
        };
        ctx.commit().await?;
        info!(group = %ctx.group.name, "Logged hangout: {}", description);

        ctx.engine.remember_hangout(&ctx.group, description).await;
        Ok(json!({ "success": true, "hangout": record }))
    }
}

#[async_trait]
impl Tool for LogHangoutTool {
    fn name(&self) -> &'static str {
        "log_hangout"
    }

    fn description(&self) -> &'static str {
        "Record that the group hung out. Only for hangouts that already happened, never for plans."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short description, e.g. \"dinner at the ramen place\""
                }
            },
            "required": ["description"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "LogHangoutTool::execute: called");
        self.run(&input, ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_log_hangout_appends_and_persists() {
        let h = Harness::new().await;
        let result = LogHangoutTool
            .execute(json!({"description": "bowling night"}), &h.group_ctx())
            .await;
        assert_eq!(result.json()["hangout"]["description"], "bowling night");

        let saved = h.saved_session().await;
        assert_eq!(saved.hangouts.len(), 1);
        assert_eq!(saved.hangouts[0].description, "bowling night");

        let memory = h.memory.query_memory("chat42", "+1").await.unwrap();
        assert_eq!(memory.total_hangouts, 1);
    }

    #[tokio::test]
    async fn test_log_hangout_default_description() {
        let h = Harness::new().await;
        LogHangoutTool.execute(json!({}), &h.group_ctx()).await;
        assert_eq!(h.session.lock().await.hangouts[0].description, "Hangout");
    }
}
