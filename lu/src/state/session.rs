//! Per-group session and its lifecycle
//!
//! A session is `Idle`, `Collecting` preferences from every member, or
//! `Ready` to deliver the compiled plan. The transition methods are the only
//! way the event changes:
//!
//! ```text
//! Idle --begin_collecting--> Collecting --last submission--> Ready --finish_delivery--> Idle
//!                                                             Ready --close_delivery---> Idle
//!                            Collecting --reopen_collecting--> Collecting
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::bookmark::Bookmarks;
use crate::llm::ConversationHandle;

/// Illegal state machine moves
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Cannot move from {from} to {to}")]
    Invalid { from: &'static str, to: &'static str },

    #[error("Not collecting preferences right now")]
    NotCollecting,

    #[error("Unknown member: {0}")]
    UnknownMember(String),

    #[error("Preferences already submitted for {0}")]
    AlreadySubmitted(String),

    #[error("Cannot collect from an empty roster")]
    EmptyRoster,
}

/// What a member told their DM agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    pub availability: String,
    pub activity: String,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Chatting,
    Done,
}

/// One member's preference conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub member_id: String,
    pub display_name: String,
    pub conversation_handle: ConversationHandle,
    pub status: AgentStatus,
    #[serde(default)]
    pub preferences: Option<Preferences>,

    /// Activity carried over from an earlier round; only availability is re-asked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_activity: Option<String>,
}

impl Agent {
    pub fn new(
        member_id: impl Into<String>,
        display_name: impl Into<String>,
        conversation_handle: impl Into<ConversationHandle>,
    ) -> Self {
        Self {
            member_id: member_id.into(),
            display_name: display_name.into(),
            conversation_handle: conversation_handle.into(),
            status: AgentStatus::Chatting,
            preferences: None,
            prior_activity: None,
        }
    }

    pub fn with_prior_activity(mut self, activity: Option<String>) -> Self {
        self.prior_activity = activity;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == AgentStatus::Done
    }
}

pub type Agents = BTreeMap<String, Agent>;

/// Where a group is in its planning cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    #[default]
    Idle,
    Collecting {
        agents: Agents,
    },
    Ready {
        agents: Agents,
        message_count: u32,
    },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Collecting { .. } => "collecting",
            Self::Ready { .. } => "ready",
        }
    }

    pub fn agents(&self) -> Option<&Agents> {
        match self {
            Self::Idle => None,
            Self::Collecting { agents } | Self::Ready { agents, .. } => Some(agents),
        }
    }
}

/// A confirmed hangout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HangoutRecord {
    pub timestamp: DateTime<Utc>,
    pub description: String,
}

/// Outcome of a successful preference submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Others are still chatting
    Pending { remaining: usize },
    /// This was the last one; the session is now `Ready`
    AllDone,
}

/// Everything the engine remembers about one group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub group_id: String,

    #[serde(default)]
    pub event: SessionEvent,

    #[serde(flatten)]
    pub bookmarks: Bookmarks,

    /// Group agent conversation, opened lazily
    #[serde(default)]
    pub group_handle: Option<ConversationHandle>,

    #[serde(default)]
    pub hangouts: Vec<HangoutRecord>,

    #[serde(default)]
    pub last_nudge_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub plan_delivered_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub bot_start_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(group_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            group_id: group_id.into(),
            event: SessionEvent::Idle,
            bookmarks: Bookmarks::default(),
            group_handle: None,
            hangouts: Vec::new(),
            last_nudge_at: None,
            plan_delivered_at: None,
            bot_start_at: Some(now),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.event, SessionEvent::Idle)
    }

    pub fn agent(&self, member_id: &str) -> Option<&Agent> {
        self.event.agents().and_then(|agents| agents.get(member_id))
    }

    /// Most recent hangout, by append order
    pub fn last_hangout(&self) -> Option<&HangoutRecord> {
        self.hangouts.last()
    }

    pub fn log_hangout(&mut self, description: impl Into<String>, now: DateTime<Utc>) {
        self.hangouts.push(HangoutRecord {
            timestamp: now,
            description: description.into(),
        });
    }

    /// Idle -> Collecting
    pub fn begin_collecting(&mut self, agents: Vec<Agent>) -> Result<(), TransitionError> {
        debug!(group_id = %self.group_id, count = agents.len(), "begin_collecting: called");
        self.check_begin()?;
        self.enter_collecting(agents)
    }

    /// Whether `begin_collecting` would be accepted right now
    pub fn check_begin(&self) -> Result<(), TransitionError> {
        if self.is_idle() {
            Ok(())
        } else {
            Err(TransitionError::Invalid {
                from: self.event.name(),
                to: "collecting",
            })
        }
    }

    /// Collecting -> Collecting with a fresh set of agents
    ///
    /// Also allowed from `Ready` before any plan message went out, since the
    /// group agent may flag a conflict right after the summary arrives.
    pub fn reopen_collecting(&mut self, agents: Vec<Agent>) -> Result<(), TransitionError> {
        debug!(group_id = %self.group_id, count = agents.len(), "reopen_collecting: called");
        self.check_reopen()?;
        self.enter_collecting(agents)
    }

    /// Whether `reopen_collecting` would be accepted right now
    pub fn check_reopen(&self) -> Result<(), TransitionError> {
        match self.event {
            SessionEvent::Collecting { .. } | SessionEvent::Ready { message_count: 0, .. } => Ok(()),
            _ => Err(TransitionError::Invalid {
                from: self.event.name(),
                to: "collecting",
            }),
        }
    }

    fn enter_collecting(&mut self, agents: Vec<Agent>) -> Result<(), TransitionError> {
        if agents.is_empty() {
            return Err(TransitionError::EmptyRoster);
        }
        let agents = agents.into_iter().map(|a| (a.member_id.clone(), a)).collect();
        info!(group_id = %self.group_id, "Session {} -> collecting", self.event.name());
        self.event = SessionEvent::Collecting { agents };
        Ok(())
    }

    /// Mark a member done; moves to `Ready` when nobody is left chatting
    pub fn record_submission(
        &mut self,
        member_id: &str,
        preferences: Preferences,
    ) -> Result<Submission, TransitionError> {
        debug!(group_id = %self.group_id, %member_id, "record_submission: called");
        let SessionEvent::Collecting { agents } = &mut self.event else {
            return Err(TransitionError::NotCollecting);
        };

        let agent = agents
            .get_mut(member_id)
            .ok_or_else(|| TransitionError::UnknownMember(member_id.to_string()))?;
        if agent.is_done() {
            return Err(TransitionError::AlreadySubmitted(member_id.to_string()));
        }
        agent.status = AgentStatus::Done;
        agent.preferences = Some(preferences);

        let remaining = agents.values().filter(|a| !a.is_done()).count();
        if remaining > 0 {
            return Ok(Submission::Pending { remaining });
        }

        let agents = std::mem::take(agents);
        info!(group_id = %self.group_id, "Session collecting -> ready");
        self.event = SessionEvent::Ready {
            agents,
            message_count: 0,
        };
        Ok(Submission::AllDone)
    }

    /// Count one outbound plan message while `Ready`; returns the new count
    pub fn count_plan_message(&mut self) -> Result<u32, TransitionError> {
        match &mut self.event {
            SessionEvent::Ready { message_count, .. } => {
                *message_count += 1;
                Ok(*message_count)
            }
            other => Err(TransitionError::Invalid {
                from: other.name(),
                to: "ready",
            }),
        }
    }

    /// Ready -> Idle, stamping the delivery time that starts the cooldown
    pub fn finish_delivery(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        debug!(group_id = %self.group_id, "finish_delivery: called");
        if !matches!(self.event, SessionEvent::Ready { .. }) {
            return Err(TransitionError::Invalid {
                from: self.event.name(),
                to: "idle",
            });
        }
        info!(group_id = %self.group_id, "Session ready -> idle");
        self.event = SessionEvent::Idle;
        self.plan_delivered_at = Some(now);
        Ok(())
    }

    /// Ready -> Idle when the delivery ended early
    ///
    /// The cooldown only starts if at least one plan message went out.
    /// Returns whether `plan_delivered_at` was stamped.
    pub fn close_delivery(&mut self, now: DateTime<Utc>) -> Result<bool, TransitionError> {
        debug!(group_id = %self.group_id, "close_delivery: called");
        let sent = match &self.event {
            SessionEvent::Ready { message_count, .. } => *message_count,
            other => {
                return Err(TransitionError::Invalid {
                    from: other.name(),
                    to: "idle",
                });
            }
        };
        if sent == 0 {
            info!(group_id = %self.group_id, "Session ready -> idle, no plan sent");
            self.event = SessionEvent::Idle;
            return Ok(false);
        }
        self.finish_delivery(now)?;
        Ok(true)
    }
}
