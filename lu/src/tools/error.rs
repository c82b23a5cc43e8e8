//! Tool errors
//!
//! Never surfaced to callers: every variant ends up as the `error` field of a
//! failed tool result the agent can read and adapt to.

use thiserror::Error;

use crate::llm::LlmError;
use crate::state::{StateError, TransitionError};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("This tool is only available in a private chat")]
    NoMember,

    #[error("Still collecting preferences; wait for the summary before messaging the group")]
    Collecting,

    #[error("Plan message limit reached. Plan has been delivered.")]
    QuotaReached,

    #[error("{0}")]
    Transition(#[from] TransitionError),

    #[error("Send failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Agent error: {0}")]
    Agent(#[from] LlmError),

    #[error("Could not save state: {0}")]
    State(#[from] StateError),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

impl From<eyre::Report> for ToolError {
    fn from(e: eyre::Report) -> Self {
        Self::Prompt(e.to_string())
    }
}
