//! Backboard API client implementation
//!
//! Implements the AgentClient trait against Backboard's thread/run REST API.
//! Assistants live server-side; each group and each collection round gets
//! its own thread.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::{
    AgentClient, AgentResponse, AgentRole, ConversationHandle, LlmError, RunStatus, ToolCall, ToolDefinition,
    ToolOutput,
};
use crate::config::AgentsConfig;

/// Maximum number of retries for transient errors
const MAX_RETRIES: u32 = 3;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Backboard API client
pub struct BackboardClient {
    api_key: String,
    base_url: String,
    http: Client,
    provider: String,
    group_assistant_id: String,
    direct_assistant_id: String,
    group_model: String,
    direct_model: String,
    /// Role of every thread this client opened
    thread_roles: Mutex<HashMap<String, AgentRole>>,
}

impl BackboardClient {
    /// Create a new client from the agents config section
    pub fn from_config(config: &AgentsConfig) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, "BackboardClient::from_config: called");
        let api_key = config
            .get_api_key()
            .map_err(|_| LlmError::MissingCredentials(config.api_key_env.clone()))?;

        let timeout = Duration::from_millis(config.timeout_ms);
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;

        Ok(Self {
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            provider: config.provider.clone(),
            group_assistant_id: config.group_assistant_id.clone(),
            direct_assistant_id: config.direct_assistant_id.clone(),
            group_model: config.group_model.clone(),
            direct_model: config.direct_model.clone(),
            thread_roles: Mutex::new(HashMap::new()),
        })
    }

    /// Use freshly synced assistant ids instead of the configured ones
    pub fn with_assistants(mut self, group: impl Into<String>, direct: impl Into<String>) -> Self {
        self.group_assistant_id = group.into();
        self.direct_assistant_id = direct.into();
        self
    }

    fn assistant_id(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Group => &self.group_assistant_id,
            AgentRole::Direct => &self.direct_assistant_id,
        }
    }

    /// Threads opened for direct chats use the direct model; anything else
    /// (including pre-existing group threads) uses the group model
    fn model_for(&self, handle: &str) -> &str {
        let role = self
            .thread_roles
            .lock()
            .ok()
            .and_then(|roles| roles.get(handle).copied())
            .unwrap_or(AgentRole::Group);
        match role {
            AgentRole::Group => &self.group_model,
            AgentRole::Direct => &self.direct_model,
        }
    }

    /// Create the named assistant, or update it if one already exists
    ///
    /// Returns the assistant id.
    pub async fn sync_assistant(
        &self,
        name: &str,
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<String, LlmError> {
        debug!(%name, tool_count = tools.len(), "sync_assistant: called");
        let body = json!({
            "name": name,
            "system_prompt": system_prompt,
            "tools": tools.iter().map(|t| t.to_function_schema()).collect::<Vec<_>>(),
        });

        let list = self.request(Method::GET, "/assistants", None).await?;
        let existing = parse_assistant_list(&list).into_iter().find(|a| a.name == name);

        let response = match existing {
            Some(assistant) => {
                debug!(id = %assistant.assistant_id, "sync_assistant: updating existing assistant");
                let path = format!("/assistants/{}", assistant.assistant_id);
                let response = self.request(Method::PUT, &path, Some(&body)).await?;
                info!("Updated assistant '{}'", name);
                response
            }
            None => {
                debug!("sync_assistant: creating new assistant");
                let response = self.request(Method::POST, "/assistants", Some(&body)).await?;
                info!("Created assistant '{}'", name);
                response
            }
        };

        response
            .get("assistant_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| LlmError::InvalidResponse("assistant response has no assistant_id".to_string()))
    }

    /// Send one request with bounded retries on transient failures
    async fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, LlmError> {
        debug!(%method, %path, "request: called");
        let url = format!("{}{}", self.base_url, path);

        let mut last_error = None;
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, %path, "request: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let mut builder = self
                .http
                .request(method.clone(), url.clone())
                .header("X-API-Key", &self.api_key)
                .header("content-type", "application/json");
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "request: network error");
                    last_error = Some(LlmError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 && attempt == MAX_RETRIES {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(60);

                return Err(LlmError::RateLimited {
                    retry_after: Duration::from_secs(retry_after),
                });
            }

            if is_retryable_status(status) && attempt < MAX_RETRIES {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "request: retryable error");
                last_error = Some(LlmError::ApiError { status, message: text });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "request: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(LlmError::ApiError { status, message: text });
            }

            debug!("request: success");
            return Ok(response.json::<Value>().await?);
        }

        Err(last_error.unwrap_or_else(|| LlmError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl AgentClient for BackboardClient {
    async fn open_conversation(&self, role: AgentRole) -> Result<ConversationHandle, LlmError> {
        debug!(%role, "open_conversation: called");
        let assistant_id = self.assistant_id(role);
        if assistant_id.is_empty() {
            return Err(LlmError::InvalidResponse(format!("No {} assistant id configured", role)));
        }

        let path = format!("/assistants/{}/threads", assistant_id);
        let value = self.request(Method::POST, &path, Some(&json!({}))).await?;
        let thread_id = value
            .get("thread_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| LlmError::InvalidResponse("thread response has no thread_id".to_string()))?;

        if let Ok(mut roles) = self.thread_roles.lock() {
            roles.insert(thread_id.to_string(), role);
        }
        info!("Opened {} thread {}", role, thread_id);
        Ok(thread_id.to_string())
    }

    async fn send_turn(&self, handle: &ConversationHandle, content: &str) -> Result<AgentResponse, LlmError> {
        debug!(%handle, content_len = content.len(), "send_turn: called");
        let body = json!({
            "content": content,
            "llm_provider": self.provider,
            "model_name": self.model_for(handle),
            "stream": false,
            "memory": "Auto",
        });
        let path = format!("/threads/{}/messages", handle);
        let value = self.request(Method::POST, &path, Some(&body)).await?;
        parse_agent_response(value)
    }

    async fn submit_tool_results(
        &self,
        handle: &ConversationHandle,
        turn_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<AgentResponse, LlmError> {
        debug!(%handle, %turn_id, count = outputs.len(), "submit_tool_results: called");
        let body = json!({ "tool_outputs": outputs });
        let path = format!("/threads/{}/runs/{}/submit-tool-outputs", handle, turn_id);
        let value = self.request(Method::POST, &path, Some(&body)).await?;
        parse_agent_response(value)
    }
}

/// Message/run response from the API
#[derive(Debug, Deserialize)]
struct WireResponse {
    content: Option<String>,
    status: Option<String>,
    #[serde(default, alias = "toolCalls")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, alias = "runId")]
    run_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    id: String,
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    /// Either a JSON-encoded string or an already-parsed object
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct WireAssistant {
    assistant_id: String,
    name: String,
}

/// Parse an API response into an AgentResponse
fn parse_agent_response(value: Value) -> Result<AgentResponse, LlmError> {
    debug!("parse_agent_response: called");
    let wire: WireResponse = serde_json::from_value(value)?;

    let tool_calls = wire
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| ToolCall {
            id: tc.id,
            name: tc.function.name,
            input: parse_arguments(tc.function.arguments),
        })
        .collect();

    Ok(AgentResponse {
        content: wire.content,
        status: wire
            .status
            .as_deref()
            .map(RunStatus::parse)
            .unwrap_or(RunStatus::Completed),
        tool_calls,
        turn_id: wire.run_id,
    })
}

/// Tool arguments arrive as a JSON string; unparsable input becomes `{}`
fn parse_arguments(arguments: Value) -> Value {
    match arguments {
        Value::String(s) if s.trim().is_empty() => json!({}),
        Value::String(s) => serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!(error = %e, "parse_arguments: unparsable tool arguments, using empty object");
            json!({})
        }),
        Value::Null => json!({}),
        other => other,
    }
}

fn parse_assistant_list(value: &Value) -> Vec<WireAssistant> {
    let items = match value {
        Value::Array(_) => value.clone(),
        Value::Object(map) => map.get("assistants").cloned().unwrap_or(Value::Array(vec![])),
        _ => Value::Array(vec![]),
    };
    serde_json::from_value(items).unwrap_or_default()
}
