//! Submit preferences tool - ends one member's private chat

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::state::{Preferences, Submission};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, optional_str, required_str};

pub struct SubmitPreferencesTool;

impl SubmitPreferencesTool {
    async fn run(&self, input: &Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let member = ctx.require_member()?.clone();
        let availability = required_str(input, "availability")?;
        let notes = optional_str(input, "notes").unwrap_or("none");

        let (preferences, outcome) = {
            let mut session = ctx.session.lock().await;
            // A rescheduling round only asks for a new time
            let activity = match optional_str(input, "activity") {
                Some(activity) => activity.to_string(),
                None => session
                    .agent(&member.contact)
                    .and_then(|a| a.prior_activity.clone())
                    .ok_or(ToolError::MissingParameter("activity"))?,
            };
            let preferences = Preferences {
                availability: availability.to_string(),
                activity,
                notes: notes.to_string(),
            };
            let outcome = session.record_submission(&member.contact, preferences.clone())?;
            (preferences, outcome)
        };
        ctx.commit().await?;
        info!(group = %ctx.group.name, member = %member.name, "Preferences submitted: {:?}", outcome);

        ctx.engine.remember_preference(&ctx.group, &member, &preferences).await;

        let all_done = outcome == Submission::AllDone;
        if all_done && ctx.is_nested() {
            // The group run that opened this chat still holds its thread
            info!(group = %ctx.group.name, "All preferences in, plan deferred until the group exchange ends");
            ctx.defer_plan();
        } else if all_done {
            ctx.engine.deliver_plan(&ctx.group, &ctx.session).await;
        }
        Ok(json!({ "success": true, "all_done": all_done }))
    }
}

#[async_trait]
impl Tool for SubmitPreferencesTool {
    fn name(&self) -> &'static str {
        "submit_preferences"
    }

    fn description(&self) -> &'static str {
        "Submit this person's availability and activity once you know both. Ends your conversation with them."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "availability": {
                    "type": "string",
                    "description": "When they are free, e.g. \"Saturday afternoon\""
                },
                "activity": {
                    "type": "string",
                    "description": "What they want to do. May be omitted when rescheduling"
                },
                "notes": {
                    "type": "string",
                    "description": "Anything else worth knowing"
                }
            },
            "required": ["availability"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(?input, "SubmitPreferencesTool::execute: called");
        self.run(&input, ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::llm::client::mock::requires;
    use crate::memory::MemoryStore;
    use crate::state::{Agent, AgentStatus, SessionEvent};

    async fn collecting(h: &Harness) {
        h.session
            .lock()
            .await
            .begin_collecting(vec![
                Agent::new("+1", "Alex", "dm-1"),
                Agent::new("+2", "Sam", "dm-2").with_prior_activity(Some("karaoke".to_string())),
            ])
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_submission_stays_collecting() {
        let h = Harness::new().await;
        collecting(&h).await;

        let result = SubmitPreferencesTool
            .execute(
                json!({"availability": "Friday 7pm", "activity": "tacos"}),
                &h.direct_ctx("+1"),
            )
            .await;
        assert_eq!(result.json(), json!({"success": true, "all_done": false}));

        let saved = h.saved_session().await;
        let alex = saved.agent("+1").unwrap();
        assert_eq!(alex.status, AgentStatus::Done);
        assert_eq!(alex.preferences.as_ref().unwrap().notes, "none");
        assert_eq!(saved.event.name(), "collecting");
        assert!(h.agents.opened().is_empty());

        let memory = h.memory.query_memory("chat42", "+1").await.unwrap();
        assert!(memory.has_history);
    }

    #[tokio::test]
    async fn test_activity_falls_back_to_carried_value() {
        let h = Harness::new().await;
        collecting(&h).await;

        let missing = SubmitPreferencesTool
            .execute(json!({"availability": "Sunday"}), &h.direct_ctx("+1"))
            .await;
        assert_eq!(missing.json()["error"], "Missing required parameter: activity");

        SubmitPreferencesTool
            .execute(json!({"availability": "Sunday"}), &h.direct_ctx("+2"))
            .await;
        let session = h.session.lock().await;
        assert_eq!(session.agent("+2").unwrap().preferences.as_ref().unwrap().activity, "karaoke");
    }

    #[tokio::test]
    async fn test_last_submission_delivers_plan() {
        let h = Harness::new().await;
        collecting(&h).await;
        h.agents.script(
            "group-1",
            vec![requires(vec![("send_group_message", json!({"message": "Friday tacos!"}))])],
        );

        SubmitPreferencesTool
            .execute(json!({"availability": "Friday", "activity": "tacos"}), &h.direct_ctx("+1"))
            .await;
        let last = SubmitPreferencesTool
            .execute(json!({"availability": "Friday", "activity": "tacos"}), &h.direct_ctx("+2"))
            .await;
        assert_eq!(last.json()["all_done"], true);

        let summary = &h.agents.turns_for("group-1")[0];
        assert!(summary.contains("[ALL PREFERENCES COLLECTED]"));
        assert!(summary.contains("Alex"));
        assert!(summary.contains("Sam"));
        assert_eq!(h.transport.group_sends().len(), 1);

        // One plan message then the exchange ended: the cycle is closed anyway
        let session = h.session.lock().await;
        assert!(matches!(session.event, SessionEvent::Idle));
        assert!(session.plan_delivered_at.is_some());
    }

    #[tokio::test]
    async fn test_double_submission_rejected() {
        let h = Harness::new().await;
        collecting(&h).await;
        let input = json!({"availability": "Friday", "activity": "tacos"});
        SubmitPreferencesTool.execute(input.clone(), &h.direct_ctx("+1")).await;
        let again = SubmitPreferencesTool.execute(input, &h.direct_ctx("+1")).await;
        assert!(again.is_error);
    }
}
