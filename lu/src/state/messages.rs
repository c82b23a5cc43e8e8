//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use super::session::Session;

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt state file: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("State file {0} is locked by another process")]
    Locked(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    GetSession {
        group_id: String,
        reply: oneshot::Sender<StateResponse<Option<Session>>>,
    },
    SaveSession {
        session: Session,
        reply: oneshot::Sender<StateResponse<()>>,
    },
    ListSessions {
        reply: oneshot::Sender<StateResponse<Vec<Session>>>,
    },

    // Shutdown
    Shutdown,
}
