//! Send group message tool - the group agent's voice, rate limited during plan delivery

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::limiter::GroupSend;
use crate::state::SessionEvent;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, required_str};

pub struct SendGroupMessageTool;

impl SendGroupMessageTool {
    async fn run(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let message = required_str(input, "message")?;
        let limiter = ctx.engine.limiter();

        // The pending plan gets its own exchange; this one is not part of it
        let verdict = if ctx.plan_pending() {
            GroupSend::Free
        } else {
            let session = ctx.session.lock().await;
            limiter.group_send(&session.event, ctx.delivery_closed())
        };
        debug!(?verdict, "SendGroupMessageTool::run: verdict");

        match verdict {
            GroupSend::Collecting => Err(ToolError::Collecting),
            GroupSend::QuotaReached => {
                let closed = {
                    let mut session = ctx.session.lock().await;
                    matches!(session.event, SessionEvent::Ready { .. }) && session.finish_delivery(Utc::now()).is_ok()
                };
                ctx.close_delivery();
                if closed {
                    ctx.commit().await?;
                }
                info!(group = %ctx.group.name, "Blocked group message: plan message limit reached");
                Err(ToolError::QuotaReached)
            }
            GroupSend::Free => {
                ctx.engine.transport().send_group_message(&ctx.group.chat_id, message).await?;
                Ok(json!({ "success": true }))
            }
            GroupSend::Plan { number, last } => {
                ctx.engine.transport().send_group_message(&ctx.group.chat_id, message).await?;
                {
                    let mut session = ctx.session.lock().await;
                    session.count_plan_message()?;
                    if last {
                        session.finish_delivery(Utc::now())?;
                    }
                }
                if last {
                    ctx.close_delivery();
                    info!(group = %ctx.group.name, "Plan delivered ({} messages)", number);
                }
                ctx.commit().await?;
                Ok(json!({
                    "success": true,
                    "plan_message": number,
                    "remaining": limiter.plan_message_limit().saturating_sub(number),
                }))
            }
        }
    }
}

#[async_trait]
impl Tool for SendGroupMessageTool {
    fn name(&self) -> &'static str {
        "send_group_message"
    }

    fn description(&self) -> &'static str {
        "Send a message to the group chat. This is the only way to talk to the group."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "The message text to send to the group chat"
                }
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SendGroupMessageTool::execute: called");
        self.run(&input, ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::state::{Agent, Preferences};

    async fn ready_harness() -> Harness {
        let h = Harness::new().await;
        {
            let mut session = h.session.lock().await;
            session
                .begin_collecting(vec![Agent::new("+1", "Alex", "dm-1"), Agent::new("+2", "Sam", "dm-2")])
                .unwrap();
            for contact in ["+1", "+2"] {
                session
                    .record_submission(
                        contact,
                        Preferences {
                            availability: "Friday 7pm".to_string(),
                            activity: "sushi".to_string(),
                            notes: "none".to_string(),
                        },
                    )
                    .unwrap();
            }
        }
        h
    }

    #[tokio::test]
    async fn test_free_send_when_idle() {
        let h = Harness::new().await;
        let result = SendGroupMessageTool
            .execute(json!({"message": "hi all"}), &h.group_ctx())
            .await;
        assert!(!result.is_error);
        assert_eq!(h.transport.group_sends(), vec![("chat42".to_string(), "hi all".to_string())]);
    }

    #[tokio::test]
    async fn test_missing_message() {
        let h = Harness::new().await;
        let result = SendGroupMessageTool.execute(json!({}), &h.group_ctx()).await;
        assert!(result.is_error);
        assert_eq!(result.json()["error"], "Missing required parameter: message");
    }

    #[tokio::test]
    async fn test_blocked_while_collecting() {
        let h = Harness::new().await;
        h.session
            .lock()
            .await
            .begin_collecting(vec![Agent::new("+1", "Alex", "dm-1")])
            .unwrap();

        let result = SendGroupMessageTool
            .execute(json!({"message": "here's the plan"}), &h.group_ctx())
            .await;
        assert!(result.is_error);
        assert!(h.transport.group_sends().is_empty());
    }

    #[tokio::test]
    async fn test_third_plan_message_rejected() {
        let h = ready_harness().await;
        let ctx = h.group_ctx();

        let first = SendGroupMessageTool.execute(json!({"message": "plan"}), &ctx).await;
        assert_eq!(first.json()["plan_message"], 1);
        assert_eq!(h.session.lock().await.event.name(), "ready");

        let second = SendGroupMessageTool.execute(json!({"message": "links"}), &ctx).await;
        assert_eq!(second.json()["remaining"], 0);
        {
            let session = h.session.lock().await;
            assert!(session.is_idle());
            assert!(session.plan_delivered_at.is_some());
        }

        let third = SendGroupMessageTool.execute(json!({"message": "one more"}), &ctx).await;
        assert!(third.is_error);
        assert_eq!(third.json()["error"], "Plan message limit reached. Plan has been delivered.");
        assert_eq!(h.transport.group_sends().len(), 2);

        // Persisted
        let saved = h.saved_session().await;
        assert!(saved.is_idle());
    }

    #[tokio::test]
    async fn test_exhausted_ready_is_closed_on_rejection() {
        let h = ready_harness().await;
        if let SessionEvent::Ready { message_count, .. } = &mut h.session.lock().await.event {
            *message_count = 2;
        }

        let result = SendGroupMessageTool
            .execute(json!({"message": "again"}), &h.group_ctx())
            .await;
        assert!(result.is_error);
        let session = h.session.lock().await;
        assert!(session.is_idle());
        assert!(session.plan_delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_send_does_not_count() {
        let h = ready_harness().await;
        h.transport.fail_sends();

        let result = SendGroupMessageTool.execute(json!({"message": "plan"}), &h.group_ctx()).await;
        assert!(result.is_error);
        match &h.session.lock().await.event {
            SessionEvent::Ready { message_count, .. } => assert_eq!(*message_count, 0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_while_plan_pending_is_not_a_plan_message() {
        let h = ready_harness().await;
        let ctx = h.group_ctx();
        ctx.defer_plan();

        let result = SendGroupMessageTool.execute(json!({"message": "DMs sent!"}), &ctx).await;
        assert_eq!(result.json(), json!({"success": true}));
        match &h.session.lock().await.event {
            SessionEvent::Ready { message_count, .. } => assert_eq!(*message_count, 0),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
