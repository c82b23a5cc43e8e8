//! Request reschedule tool - re-opens every private chat to find a new time

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::tools::{Tool, ToolContext, ToolError, ToolResult, required_str};

pub struct RequestRescheduleTool;

impl RequestRescheduleTool {
    async fn run(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let conflict = required_str(input, "conflict_summary")?;
        info!(group = %ctx.group.name, "Schedule conflict: {}", conflict);
        let members = ctx.engine.open_collection_round(ctx, Some(conflict)).await?;
        Ok(json!({ "success": true, "rescheduling": true, "members": members }))
    }
}

#[async_trait]
impl Tool for RequestRescheduleTool {
    fn name(&self) -> &'static str {
        "request_reschedule"
    }

    fn description(&self) -> &'static str {
        "Call this when members' availability does not overlap. Every member gets a new private \
         chat asking only for a different time; their activity is kept. Send nothing to the group until times work."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "conflict_summary": {
                    "type": "string",
                    "description": "One line describing the conflict, e.g. \"Alex is free at 2pm but Sam only at 6pm\""
                }
            },
            "required": ["conflict_summary"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "RequestRescheduleTool::execute: called");
        self.run(&input, ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::state::{Agent, Preferences};

    #[tokio::test]
    async fn test_reschedule_carries_activity_forward() {
        let h = Harness::new().await;
        {
            let mut session = h.session.lock().await;
            session
                .begin_collecting(vec![Agent::new("+1", "Alex", "dm-a"), Agent::new("+2", "Sam", "dm-b")])
                .unwrap();
            session
                .record_submission(
                    "+1",
                    Preferences {
                        availability: "Friday 2pm".to_string(),
                        activity: "bowling".to_string(),
                        notes: "none".to_string(),
                    },
                )
                .unwrap();
        }

        let result = RequestRescheduleTool
            .execute(json!({"conflict_summary": "Alex 2pm vs Sam 6pm"}), &h.group_ctx())
            .await;
        assert_eq!(result.json()["rescheduling"], true);

        let session = h.session.lock().await;
        assert_eq!(session.event.name(), "collecting");
        let alex = session.agent("+1").unwrap();
        assert_eq!(alex.conversation_handle, "dm-1");
        assert_eq!(alex.prior_activity.as_deref(), Some("bowling"));
        assert!(alex.preferences.is_none());
        assert_eq!(session.agent("+2").unwrap().prior_activity, None);

        let opening = &h.agents.turns_for("dm-1")[0];
        assert!(opening.contains("RESCHEDULE"));
        assert!(opening.contains("Alex 2pm vs Sam 6pm"));
        assert!(opening.contains("\"bowling\""));
        assert!(!h.agents.turns_for("dm-2")[0].contains("already said"));
    }

    #[tokio::test]
    async fn test_reschedule_requires_conflict_summary() {
        let h = Harness::new().await;
        let result = RequestRescheduleTool.execute(json!({}), &h.group_ctx()).await;
        assert_eq!(result.json()["error"], "Missing required parameter: conflict_summary");
    }

    #[tokio::test]
    async fn test_reschedule_rejected_when_idle() {
        let h = Harness::new().await;
        let result = RequestRescheduleTool
            .execute(json!({"conflict_summary": "nope"}), &h.group_ctx())
            .await;
        assert!(result.is_error);
        assert!(h.agents.opened().is_empty());
    }
}
