//! ToolContext - execution context for tools

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::ToolError;
use crate::config::{GroupConfig, Member};
use crate::engine::{Engine, SharedSession};
use crate::state::{AgentStatus, StateError};

/// Execution context for one exchange
///
/// Group exchanges have no member; private-chat exchanges are scoped to the
/// member on the other end.
#[derive(Clone)]
pub struct ToolContext {
    pub engine: Arc<Engine>,
    pub group: Arc<GroupConfig>,
    pub session: SharedSession,

    /// Member on the other end of a private chat
    pub member: Option<Member>,

    /// Set once this exchange closed a plan delivery
    delivery_closed: Arc<AtomicBool>,

    /// Shared with private chats opened from a group exchange; set when the
    /// last submission arrives while the group run is still waiting on tools
    plan_pending: Arc<AtomicBool>,

    /// Running inside a group exchange rather than as its own turn
    nested: bool,
}

impl ToolContext {
    /// Context for a group-agent exchange
    pub fn group(engine: Arc<Engine>, group: Arc<GroupConfig>, session: SharedSession) -> Self {
        debug!(group = %group.name, "ToolContext::group: called");
        Self {
            engine,
            group,
            session,
            member: None,
            delivery_closed: Arc::new(AtomicBool::new(false)),
            plan_pending: Arc::new(AtomicBool::new(false)),
            nested: false,
        }
    }

    /// Context for a private-chat exchange with `member`
    pub fn direct(engine: Arc<Engine>, group: Arc<GroupConfig>, session: SharedSession, member: Member) -> Self {
        debug!(group = %group.name, member = %member.contact, "ToolContext::direct: called");
        Self {
            engine,
            group,
            session,
            member: Some(member),
            delivery_closed: Arc::new(AtomicBool::new(false)),
            plan_pending: Arc::new(AtomicBool::new(false)),
            nested: false,
        }
    }

    /// Private chat opened from within this exchange
    ///
    /// Shares the pending-plan flag so a plan completed there is delivered
    /// once this exchange's own run has finished.
    pub fn for_member(&self, member: Member) -> Self {
        Self {
            member: Some(member),
            delivery_closed: Arc::new(AtomicBool::new(false)),
            nested: true,
            ..self.clone()
        }
    }

    pub fn require_member(&self) -> Result<&Member, ToolError> {
        self.member.as_ref().ok_or(ToolError::NoMember)
    }

    /// Persist the session as it is now
    pub async fn commit(&self) -> Result<(), StateError> {
        self.engine.commit(&self.session).await
    }

    pub fn close_delivery(&self) {
        self.delivery_closed.store(true, Ordering::SeqCst);
    }

    pub fn delivery_closed(&self) -> bool {
        self.delivery_closed.load(Ordering::SeqCst)
    }

    /// Whether an enclosing group run is still waiting on tool results
    pub fn is_nested(&self) -> bool {
        self.nested
    }

    pub fn defer_plan(&self) {
        self.plan_pending.store(true, Ordering::SeqCst);
    }

    /// A plan is waiting for this exchange to end
    pub fn plan_pending(&self) -> bool {
        self.plan_pending.load(Ordering::SeqCst)
    }

    /// Clear and return the pending-plan flag
    pub fn take_pending_plan(&self) -> bool {
        self.plan_pending.swap(false, Ordering::SeqCst)
    }

    /// Whether this context's member still has an open preference chat
    pub async fn member_still_chatting(&self) -> bool {
        let Some(member) = &self.member else {
            return false;
        };
        let session = self.session.lock().await;
        session
            .agent(&member.contact)
            .is_some_and(|a| a.status == AgentStatus::Chatting)
    }
}
