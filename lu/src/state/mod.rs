//! Session state with actor pattern
//!
//! StateManager owns the persisted session map and processes messages via
//! channels; `Session` carries the per-group lifecycle and read cursors.

mod bookmark;
mod manager;
mod messages;
mod session;

pub use bookmark::{Bookmarks, Source};
pub use manager::{StateManager, load_sessions};
pub use messages::{StateCommand, StateError, StateResponse};
pub use session::{
    Agent, AgentStatus, Agents, HangoutRecord, Preferences, Session, SessionEvent, Submission, TransitionError,
};
