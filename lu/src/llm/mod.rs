//! Remote agent module for LinkUp
//!
//! The decision-making side of the system lives in two remote assistants:
//! one that speaks in the group chat and one that runs private preference
//! chats. This module holds the client abstraction and its HTTP backend.

use std::sync::Arc;

use tracing::debug;

mod backboard;
pub mod client;
mod error;
mod types;

pub use backboard::BackboardClient;
pub use client::AgentClient;
pub use error::LlmError;
pub use types::{AgentResponse, AgentRole, ConversationHandle, RunStatus, ToolCall, ToolDefinition, ToolOutput};

use crate::config::AgentsConfig;

/// Create the agent client described by the config
pub fn create_client(config: &AgentsConfig) -> Result<Arc<dyn AgentClient>, LlmError> {
    debug!(base_url = %config.base_url, "create_client: called");
    Ok(Arc::new(BackboardClient::from_config(config)?))
}
