//! Suggest fallback tool - ideas for people who don't know what they want

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::memory::Category;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub struct SuggestFallbackTool;

impl SuggestFallbackTool {
    async fn run(&self, ctx: &ToolContext) -> Result<Value, ToolError> {
        let member = ctx.require_member()?;
        let memory = ctx.engine.recall(&ctx.group.chat_id, &member.contact).await;

        let ideas: Vec<Category> = if memory.has_history {
            memory.never_tried
        } else {
            Category::ALL.to_vec()
        };

        let mut result = json!({ "never_tried": ideas });
        if let Some(favorite) = memory.group_favorites.first() {
            result["group_favorite"] = json!(favorite.category);
        }
        if let Some(url) = ctx.engine.suggestion_url() {
            result["suggestion_url"] = json!(url);
        }
        Ok(result)
    }
}

#[async_trait]
impl Tool for SuggestFallbackTool {
    fn name(&self) -> &'static str {
        "suggest_fallback"
    }

    fn description(&self) -> &'static str {
        "Get a few ideas when the person has no idea what to do: things the group has never tried, plus a link to browse."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        debug!(group = %ctx.group.name, "SuggestFallbackTool::execute: called");
        self.run(ctx).await.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::harness::Harness;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn test_everything_is_new_without_history() {
        let h = Harness::new().await;
        let result = SuggestFallbackTool.execute(json!({}), &h.direct_ctx("+1")).await.json();
        assert_eq!(result["never_tried"].as_array().unwrap().len(), Category::ALL.len());
        assert_eq!(result["suggestion_url"], "https://example.com/ideas");
    }

    #[tokio::test]
    async fn test_skips_tried_categories() {
        let h = Harness::new().await;
        h.memory.record_hangout("chat42", "Roommates", "sushi dinner").await.unwrap();

        let result = SuggestFallbackTool.execute(json!({}), &h.direct_ctx("+1")).await.json();
        let ideas = result["never_tried"].as_array().unwrap();
        assert!(!ideas.contains(&json!("food")));
        assert!(ideas.contains(&json!("movies")));
    }
}
