//! AgentClient trait definition

use async_trait::async_trait;

use super::{AgentResponse, AgentRole, ConversationHandle, LlmError, ToolOutput};

/// Stateful client for remote agents
///
/// Unlike a plain completion API, the remote side keeps the conversation:
/// callers only hold an opaque handle and push new turns into it. A turn may
/// pause with tool calls; the run resumes when the outputs are submitted.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Open a fresh conversation with the assistant for `role`
    async fn open_conversation(&self, role: AgentRole) -> Result<ConversationHandle, LlmError>;

    /// Append a user turn and wait for the agent's response
    async fn send_turn(&self, handle: &ConversationHandle, content: &str) -> Result<AgentResponse, LlmError>;

    /// Submit every tool output for a paused run and wait for the next response
    async fn submit_tool_results(
        &self,
        handle: &ConversationHandle,
        turn_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<AgentResponse, LlmError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing::debug;

    use crate::llm::{RunStatus, ToolCall};

    /// Build a response that requests the given tool calls
    pub fn requires(calls: Vec<(&str, serde_json::Value)>) -> AgentResponse {
        let tool_calls = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, input))| ToolCall {
                id: format!("call-{}-{}", name, i),
                name: name.to_string(),
                input,
            })
            .collect();
        AgentResponse {
            content: None,
            status: RunStatus::RequiresAction,
            tool_calls,
            turn_id: Some("run-1".to_string()),
        }
    }

    /// Build a terminal response with text only
    pub fn completed(text: &str) -> AgentResponse {
        AgentResponse {
            content: Some(text.to_string()),
            status: RunStatus::Completed,
            tool_calls: vec![],
            turn_id: Some("run-1".to_string()),
        }
    }

    /// Scripted agent client for unit tests
    ///
    /// Handles are deterministic: group conversations are `group-N`, direct
    /// conversations are `dm-N`, both counting from 1 in open order. Each
    /// handle has its own response queue shared by turns and submissions;
    /// an empty queue answers with a completed, tool-free response.
    #[derive(Default)]
    pub struct ScriptedAgentClient {
        scripts: Mutex<HashMap<String, VecDeque<AgentResponse>>>,
        failing: Mutex<HashSet<String>>,
        turns: Mutex<Vec<(String, String)>>,
        submissions: Mutex<Vec<(String, String, Vec<ToolOutput>)>>,
        opened: Mutex<Vec<(AgentRole, String)>>,
        events: Mutex<Vec<String>>,
        group_count: AtomicUsize,
        direct_count: AtomicUsize,
        fail_open: Mutex<bool>,
    }

    impl ScriptedAgentClient {
        pub fn new() -> Self {
            debug!("ScriptedAgentClient::new: called");
            Self::default()
        }

        /// Queue responses for a handle
        pub fn script(&self, handle: &str, responses: Vec<AgentResponse>) {
            debug!(%handle, count = responses.len(), "ScriptedAgentClient::script: called");
            self.scripts
                .lock()
                .unwrap()
                .entry(handle.to_string())
                .or_default()
                .extend(responses);
        }

        /// Make every turn on `handle` fail
        pub fn fail_turns(&self, handle: &str) {
            self.failing.lock().unwrap().insert(handle.to_string());
        }

        /// Make `open_conversation` fail
        pub fn fail_open(&self) {
            *self.fail_open.lock().unwrap() = true;
        }

        /// Every `(handle, content)` sent as a turn, in order
        pub fn turns(&self) -> Vec<(String, String)> {
            self.turns.lock().unwrap().clone()
        }

        /// Turns sent to one handle
        pub fn turns_for(&self, handle: &str) -> Vec<String> {
            self.turns()
                .into_iter()
                .filter(|(h, _)| h == handle)
                .map(|(_, c)| c)
                .collect()
        }

        /// Every `(handle, turn_id, outputs)` submission, in order
        pub fn submissions(&self) -> Vec<(String, String, Vec<ToolOutput>)> {
            self.submissions.lock().unwrap().clone()
        }

        /// `turn:<handle>` and `submit:<handle>` for one handle, in call order
        pub fn events_for(&self, handle: &str) -> Vec<String> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.split_once(':').is_some_and(|(_, h)| h == handle))
                .cloned()
                .collect()
        }

        /// Every opened conversation
        pub fn opened(&self) -> Vec<(AgentRole, String)> {
            self.opened.lock().unwrap().clone()
        }

        fn next(&self, handle: &str) -> Result<AgentResponse, LlmError> {
            if self.failing.lock().unwrap().contains(handle) {
                return Err(LlmError::ApiError {
                    status: 500,
                    message: format!("scripted failure for {}", handle),
                });
            }
            let response = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(handle)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| AgentResponse {
                    content: None,
                    status: RunStatus::Completed,
                    tool_calls: vec![],
                    turn_id: None,
                });
            Ok(response)
        }
    }

    #[async_trait]
    impl AgentClient for ScriptedAgentClient {
        async fn open_conversation(&self, role: AgentRole) -> Result<ConversationHandle, LlmError> {
            debug!(%role, "ScriptedAgentClient::open_conversation: called");
            if *self.fail_open.lock().unwrap() {
                return Err(LlmError::InvalidResponse("scripted open failure".to_string()));
            }
            let handle = match role {
                AgentRole::Group => format!("group-{}", self.group_count.fetch_add(1, Ordering::SeqCst) + 1),
                AgentRole::Direct => format!("dm-{}", self.direct_count.fetch_add(1, Ordering::SeqCst) + 1),
            };
            self.opened.lock().unwrap().push((role, handle.clone()));
            Ok(handle)
        }

        async fn send_turn(&self, handle: &ConversationHandle, content: &str) -> Result<AgentResponse, LlmError> {
            debug!(%handle, "ScriptedAgentClient::send_turn: called");
            self.turns.lock().unwrap().push((handle.clone(), content.to_string()));
            self.events.lock().unwrap().push(format!("turn:{}", handle));
            self.next(handle)
        }

        async fn submit_tool_results(
            &self,
            handle: &ConversationHandle,
            turn_id: &str,
            outputs: Vec<ToolOutput>,
        ) -> Result<AgentResponse, LlmError> {
            debug!(%handle, %turn_id, count = outputs.len(), "ScriptedAgentClient::submit_tool_results: called");
            self.submissions
                .lock()
                .unwrap()
                .push((handle.clone(), turn_id.to_string(), outputs));
            self.events.lock().unwrap().push(format!("submit:{}", handle));
            self.next(handle)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use serde_json::json;

        #[tokio::test]
        async fn test_scripted_client_handles_are_sequential() {
            let client = ScriptedAgentClient::new();

            assert_eq!(client.open_conversation(AgentRole::Direct).await.unwrap(), "dm-1");
            assert_eq!(client.open_conversation(AgentRole::Direct).await.unwrap(), "dm-2");
            assert_eq!(client.open_conversation(AgentRole::Group).await.unwrap(), "group-1");
            assert_eq!(client.opened().len(), 3);
        }

        #[tokio::test]
        async fn test_scripted_client_replays_queue_then_completes() {
            let client = ScriptedAgentClient::new();
            client.script("dm-1", vec![requires(vec![("send_reply", json!({"message": "hi"}))])]);

            let handle = "dm-1".to_string();
            let first = client.send_turn(&handle, "hello").await.unwrap();
            assert!(first.requires_action());
            assert_eq!(first.tool_calls[0].id, "call-send_reply-0");

            let second = client.send_turn(&handle, "again").await.unwrap();
            assert!(!second.requires_action());
            assert_eq!(client.turns_for("dm-1"), vec!["hello", "again"]);
        }

        #[tokio::test]
        async fn test_scripted_client_failure() {
            let client = ScriptedAgentClient::new();
            client.fail_turns("group-1");
            let result = client.send_turn(&"group-1".to_string(), "hi").await;
            assert!(result.is_err());
        }
    }
}
