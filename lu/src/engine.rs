//! Engine - per-group orchestration
//!
//! One poll cycle visits every configured group in order. For each group the
//! engine loads its session, ingests new group messages, then new private
//! replies, then checks whether the group is due a nudge. Every step that
//! changes the session is persisted before the next one starts.

use std::sync::Arc;

use chrono::Utc;
use eyre::Context;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::aggregate::{carried_activity, compile_summary};
use crate::config::{Config, GroupConfig, Member};
use crate::exchange::{ExchangeOutcome, run_exchange, run_exchange_with_nudge};
use crate::limiter::{Inbound, Limiter};
use crate::llm::{AgentClient, AgentRole, ConversationHandle, LlmError, create_client};
use crate::memory::{GroupMemory, HangoutStats, MemoryStore, NullMemoryStore, PreferenceInput, SqliteMemoryStore};
use crate::prompts::{
    DirectoryEntry, IncomingContext, NudgeContext, OpeningContext, PromptLoader, RescheduleContext, SummaryContext,
};
use crate::state::{Agent, AgentStatus, Preferences, Session, SessionEvent, Source, StateError, StateManager};
use crate::tools::{ToolContext, ToolError, ToolExecutor, ToolProfile};
use crate::transport::{ChatDbTransport, InboundMessage, Transport};

/// A group's session, shared between the engine and the tools of one cycle
pub type SharedSession = Arc<Mutex<Session>>;

/// Orchestration engine
pub struct Engine {
    agents: Arc<dyn AgentClient>,
    transport: Arc<dyn Transport>,
    memory: Arc<dyn MemoryStore>,
    state: StateManager,
    prompts: PromptLoader,
    limiter: Limiter,
    group_tools: ToolExecutor,
    direct_tools: ToolExecutor,
    groups: Vec<Arc<GroupConfig>>,
    suggestion_url: Option<String>,
}

impl Engine {
    pub fn new(
        config: &Config,
        agents: Arc<dyn AgentClient>,
        transport: Arc<dyn Transport>,
        memory: Arc<dyn MemoryStore>,
        state: StateManager,
    ) -> Self {
        debug!(groups = config.groups.len(), "Engine::new: called");
        Self {
            agents,
            transport,
            memory,
            state,
            prompts: PromptLoader::new(config.prompts_dir.as_deref()),
            limiter: Limiter::new(&config.limits),
            group_tools: ToolExecutor::with_profile(ToolProfile::Group),
            direct_tools: ToolExecutor::with_profile(ToolProfile::Direct),
            groups: config.groups.iter().cloned().map(Arc::new).collect(),
            suggestion_url: config.memory.suggestion_url.clone(),
        }
    }

    /// Wire up the real collaborators described by the config
    ///
    /// Must run inside a tokio runtime (the state actor is spawned here).
    pub fn bootstrap(config: &Config) -> eyre::Result<Arc<Self>> {
        debug!("Engine::bootstrap: called");
        let agents = create_client(&config.agents).context("Failed to create agent client")?;
        let transport: Arc<dyn Transport> = Arc::new(ChatDbTransport::from_config(&config.transport));

        let memory: Arc<dyn MemoryStore> = if config.memory.enabled {
            match SqliteMemoryStore::open(&config.memory.path) {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    warn!(error = %e, "Memory store unavailable, continuing without history");
                    Arc::new(NullMemoryStore)
                }
            }
        } else {
            Arc::new(NullMemoryStore)
        };

        let state = StateManager::spawn(&config.state.path)
            .with_context(|| format!("Failed to open state file {}", config.state.path.display()))?;

        Ok(Arc::new(Self::new(config, agents, transport, memory, state)))
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    pub fn prompts(&self) -> &PromptLoader {
        &self.prompts
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn suggestion_url(&self) -> Option<&str> {
        self.suggestion_url.as_deref()
    }

    /// Persist the session as it is now
    pub async fn commit(&self, session: &SharedSession) -> Result<(), StateError> {
        let snapshot = session.lock().await.clone();
        self.state.save_session(snapshot).await
    }

    /// Visit every group once
    ///
    /// Failures are logged per group; one broken group never stops the others.
    pub async fn poll_cycle(self: &Arc<Self>) {
        debug!("poll_cycle: called");
        for group in &self.groups {
            if let Err(e) = self.poll_group(group).await {
                error!(group = %group.name, "Poll failed: {:#}", e);
            }
        }
    }

    async fn poll_group(self: &Arc<Self>, group: &Arc<GroupConfig>) -> eyre::Result<()> {
        debug!(group = %group.name, "poll_group: called");
        let session = self.load_session(group).await?;

        if let Err(e) = self.ingest_group(group, &session).await {
            warn!(group = %group.name, "Group ingest failed: {:#}", e);
        }
        self.ingest_direct(group, &session).await?;
        self.check_threshold(group, &session).await?;
        Ok(())
    }

    /// Stored session for a group, created on first sight
    async fn load_session(&self, group: &GroupConfig) -> Result<SharedSession, StateError> {
        debug!(group = %group.name, "load_session: called");
        let now = Utc::now();
        let (mut session, mut dirty) = match self.state.get_session(&group.chat_id).await? {
            Some(session) => (session, false),
            None => {
                info!(group = %group.name, "New session for {}", group.chat_id);
                (Session::new(&group.chat_id, now), true)
            }
        };

        if session.bot_start_at.is_none() {
            session.bot_start_at = Some(now);
            dirty = true;
        }

        // A delivery never outlives its exchange; one left over means we crashed mid-way
        if matches!(session.event, SessionEvent::Ready { .. }) {
            warn!(group = %group.name, "Closing a plan delivery left over from a previous run");
            if session.close_delivery(now).is_ok() {
                dirty = true;
            }
        }

        let session = Arc::new(Mutex::new(session));
        if dirty {
            self.commit(&session).await?;
        }
        Ok(session)
    }

    async fn ingest_group(self: &Arc<Self>, group: &Arc<GroupConfig>, session: &SharedSession) -> eyre::Result<()> {
        debug!(group = %group.name, "ingest_group: called");
        let Some(since) = self.cursor_or_initialize(session, Source::Group, &group.chat_id).await? else {
            return Ok(());
        };

        let messages = self.transport.list_new_messages(&group.chat_id, since).await?;
        if !messages.is_empty() {
            debug!(group = %group.name, count = messages.len(), "ingest_group: new messages");
        }

        for message in messages {
            if !message.is_self {
                self.handle_group_message(group, session, &message).await;
            }
            session.lock().await.bookmarks.advance(Source::Group, message.sequence);
            self.commit(session).await?;
        }
        Ok(())
    }

    async fn ingest_direct(self: &Arc<Self>, group: &Arc<GroupConfig>, session: &SharedSession) -> eyre::Result<()> {
        debug!(group = %group.name, "ingest_direct: called");
        for member in &group.members {
            if let Err(e) = self.ingest_member(group, session, member).await {
                // State failures are not per-member; stop the group
                if e.downcast_ref::<StateError>().is_some() {
                    return Err(e);
                }
                warn!(group = %group.name, member = %member.name, "Private chat ingest failed: {:#}", e);
            }
        }
        Ok(())
    }

    async fn ingest_member(
        self: &Arc<Self>,
        group: &Arc<GroupConfig>,
        session: &SharedSession,
        member: &Member,
    ) -> eyre::Result<()> {
        let source = Source::Direct(&member.contact);
        let Some(since) = self.cursor_or_initialize(session, source, &member.contact).await? else {
            return Ok(());
        };

        let messages = self.transport.list_new_messages(&member.contact, since).await?;
        for message in messages {
            // A round opened earlier in this cycle may have moved the cursor past this one
            let current = session.lock().await.bookmarks.cursor(source);
            if current.is_some_and(|c| c >= message.sequence) {
                continue;
            }

            if !message.is_self {
                self.handle_direct_message(group, session, member, &message).await;
            }
            session.lock().await.bookmarks.advance(source, message.sequence);
            self.commit(session).await?;
        }
        Ok(())
    }

    /// Stored cursor for `source`, or `None` after starting it at the latest message
    async fn cursor_or_initialize(
        &self,
        session: &SharedSession,
        source: Source<'_>,
        conversation: &str,
    ) -> eyre::Result<Option<i64>> {
        if let Some(cursor) = session.lock().await.bookmarks.cursor(source) {
            return Ok(Some(cursor));
        }

        let latest = self.transport.latest_sequence(conversation).await?;
        session.lock().await.bookmarks.initialize(source, latest);
        self.commit(session).await?;
        info!(%conversation, latest, "Started cursor at latest message");
        Ok(None)
    }

    async fn handle_group_message(
        self: &Arc<Self>,
        group: &Arc<GroupConfig>,
        session: &SharedSession,
        message: &InboundMessage,
    ) {
        debug!(group = %group.name, sequence = message.sequence, "handle_group_message: called");
        let verdict = {
            let session = session.lock().await;
            self.limiter.inbound(&session, Utc::now())
        };

        match verdict {
            Inbound::Busy(state) => {
                info!(group = %group.name, "Dropping group message while {}", state);
                return;
            }
            Inbound::Cooldown { remaining_secs } => {
                info!(group = %group.name, "Dropping group message, plan cooldown ({}s left)", remaining_secs);
                return;
            }
            Inbound::Forward => {}
        }

        let context = IncomingContext {
            group_name: group.name.clone(),
            members: DirectoryEntry::roster(group),
            sender: group.display_name(&message.sender_id).to_string(),
            text: message.text.clone(),
        };
        let result = match self.prompts.render("incoming", &context) {
            Ok(prompt) => self.group_exchange(group, session, &prompt).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(group = %group.name, "Group exchange failed: {:#}", e);
        }
    }

    async fn handle_direct_message(
        self: &Arc<Self>,
        group: &Arc<GroupConfig>,
        session: &SharedSession,
        member: &Member,
        message: &InboundMessage,
    ) {
        debug!(group = %group.name, member = %member.name, "handle_direct_message: called");
        let handle = {
            let session = session.lock().await;
            match session.agent(&member.contact) {
                Some(agent) if agent.status == AgentStatus::Chatting => agent.conversation_handle.clone(),
                _ => {
                    debug!(member = %member.name, "handle_direct_message: no open preference chat, skipping");
                    return;
                }
            }
        };

        let ctx = ToolContext::direct(self.clone(), group.clone(), session.clone(), member.clone());
        if let Err(e) = self.direct_turn(&ctx, &handle, &message.text).await {
            error!(group = %group.name, member = %member.name, "Private chat exchange failed: {:#}", e);
        }
    }

    /// Nudge an idle group that has not hung out for a while
    async fn check_threshold(self: &Arc<Self>, group: &Arc<GroupConfig>, session: &SharedSession) -> eyre::Result<()> {
        let now = Utc::now();
        let days = {
            let session = session.lock().await;
            self.limiter.nudge_due(&session, group.hangout_threshold_days, now)
        };
        let Some(days) = days else {
            return Ok(());
        };

        // Stamped first: a failing agent must not be retried every poll
        session.lock().await.last_nudge_at = Some(now);
        self.commit(session).await?;
        info!(group = %group.name, "{} days since last hangout, nudging", days);

        let context = NudgeContext {
            group_name: group.name.clone(),
            members: DirectoryEntry::roster(group),
            days,
            threshold_days: group.hangout_threshold_days,
        };
        let result = match self.prompts.render("nudge", &context) {
            Ok(prompt) => self.group_exchange(group, session, &prompt).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            error!(group = %group.name, "Nudge exchange failed: {:#}", e);
        }
        Ok(())
    }

    /// Group agent conversation for this group, opened on first use
    async fn group_handle(&self, group: &GroupConfig, session: &SharedSession) -> eyre::Result<ConversationHandle> {
        if let Some(thread) = &group.thread_id {
            return Ok(thread.clone());
        }
        if let Some(handle) = session.lock().await.group_handle.clone() {
            return Ok(handle);
        }

        let handle = self.agents.open_conversation(AgentRole::Group).await?;
        info!(group = %group.name, %handle, "Opened group conversation");
        session.lock().await.group_handle = Some(handle.clone());
        self.commit(session).await?;
        Ok(handle)
    }

    /// Run one group exchange, then any plan it left pending
    ///
    /// A plan completed by private chats opened inside the exchange waits
    /// until the group run has its tool results, so only one run is ever
    /// active on the group conversation.
    async fn group_exchange(
        self: &Arc<Self>,
        group: &Arc<GroupConfig>,
        session: &SharedSession,
        content: &str,
    ) -> eyre::Result<()> {
        let ctx = ToolContext::group(self.clone(), group.clone(), session.clone());
        let result = self.group_turn(&ctx, content).await;
        if ctx.take_pending_plan() {
            self.deliver_plan(group, session).await;
        }
        result.map(|_| ())
    }

    /// Send one turn to the group agent and run its tool calls
    async fn group_turn(&self, ctx: &ToolContext, content: &str) -> eyre::Result<ExchangeOutcome> {
        debug!(group = %ctx.group.name, "group_turn: called");
        let handle = self.group_handle(&ctx.group, &ctx.session).await?;

        let response = self.agents.send_turn(&handle, content).await?;
        match run_exchange(self.agents.as_ref(), &self.group_tools, &handle, response, ctx).await {
            Ok(outcome) => {
                debug!(group = %ctx.group.name, tool_calls = outcome.tool_calls, "group_turn: done");
                Ok(outcome)
            }
            Err(e) => {
                if matches!(e, LlmError::RoundLimit(_)) {
                    self.release_group_handle(&ctx.group, &ctx.session).await;
                }
                Err(e.into())
            }
        }
    }

    /// Forget a group conversation whose run was abandoned mid-tools
    async fn release_group_handle(&self, group: &GroupConfig, session: &SharedSession) {
        if group.thread_id.is_some() {
            warn!(group = %group.name, "Configured group thread has an abandoned run; it cannot be replaced");
            return;
        }
        let released = session.lock().await.group_handle.take();
        if let Some(handle) = released {
            warn!(group = %group.name, %handle, "Dropping group conversation with an abandoned run");
            if let Err(e) = self.commit(session).await {
                error!(group = %group.name, "Failed to persist released conversation: {}", e);
            }
        }
    }

    /// Send one turn to a member's preference agent and run its tool calls
    async fn direct_turn(
        &self,
        ctx: &ToolContext,
        handle: &ConversationHandle,
        content: &str,
    ) -> eyre::Result<ExchangeOutcome> {
        debug!(group = %ctx.group.name, %handle, "direct_turn: called");
        let nudge = self.prompts.direct_nudge()?;

        let response = self.agents.send_turn(handle, content).await?;
        let outcome =
            run_exchange_with_nudge(self.agents.as_ref(), &self.direct_tools, handle, response, ctx, &nudge).await?;
        Ok(outcome)
    }

    /// Open one preference chat per member and start collecting
    ///
    /// With `conflict` the current round is re-opened: new conversations for
    /// everyone, each member's activity carried over, only availability
    /// re-asked. Nothing changes if the session cannot move to collecting or
    /// a conversation cannot be opened. Returns the number of members.
    pub async fn open_collection_round(
        self: &Arc<Self>,
        ctx: &ToolContext,
        conflict: Option<&str>,
    ) -> Result<usize, ToolError> {
        let group = &ctx.group;
        debug!(group = %group.name, rescheduling = conflict.is_some(), "open_collection_round: called");

        let previous = {
            let session = ctx.session.lock().await;
            match conflict {
                None => {
                    session.check_begin()?;
                    None
                }
                Some(_) => {
                    session.check_reopen()?;
                    session.event.agents().cloned()
                }
            }
        };

        let mut agents = Vec::with_capacity(group.members.len());
        let mut openings = Vec::with_capacity(group.members.len());
        for member in &group.members {
            let prior_activity = carried_activity(previous.as_ref(), member);
            let prompt = match conflict {
                None => self.prompts.render(
                    "opening",
                    &OpeningContext {
                        group_name: group.name.clone(),
                        member_name: member.name.clone(),
                    },
                )?,
                Some(conflict) => self.prompts.render(
                    "reschedule",
                    &RescheduleContext {
                        group_name: group.name.clone(),
                        member_name: member.name.clone(),
                        conflict: conflict.to_string(),
                        prior_activity: prior_activity.clone(),
                    },
                )?,
            };

            let handle = self.agents.open_conversation(AgentRole::Direct).await?;
            debug!(member = %member.name, %handle, "open_collection_round: opened conversation");
            agents.push(Agent::new(&member.contact, &member.name, handle.clone()).with_prior_activity(prior_activity));
            openings.push((member, handle, prompt));
        }

        // Earlier private messages belong to the previous round
        for member in &group.members {
            match self.transport.latest_sequence(&member.contact).await {
                Ok(latest) => {
                    ctx.session
                        .lock()
                        .await
                        .bookmarks
                        .advance(Source::Direct(&member.contact), latest);
                }
                Err(e) => warn!(member = %member.name, "Could not read private chat cursor: {}", e),
            }
        }

        {
            let mut session = ctx.session.lock().await;
            match conflict {
                None => session.begin_collecting(agents)?,
                Some(_) => session.reopen_collecting(agents)?,
            }
        }
        ctx.commit().await?;
        info!(group = %group.name, "Collecting preferences from {} members", openings.len());

        for (member, handle, prompt) in &openings {
            let member_ctx = ctx.for_member((*member).clone());
            if let Err(e) = self.direct_turn(&member_ctx, handle, prompt).await {
                warn!(member = %member.name, "Opening exchange failed: {:#}", e);
            }
        }
        Ok(openings.len())
    }

    /// Hand the compiled preferences to the group agent
    ///
    /// Runs right after the last submission, or after the group exchange
    /// that contained it. Whatever the agent does, the delivery is closed
    /// when the exchange ends. A reschedule round that completes inside the
    /// exchange is delivered next.
    pub async fn deliver_plan(self: &Arc<Self>, group: &Arc<GroupConfig>, session: &SharedSession) {
        debug!(group = %group.name, "deliver_plan: called");
        loop {
            let preferences = {
                let session = session.lock().await;
                match &session.event {
                    SessionEvent::Ready { agents, .. } => compile_summary(group, agents),
                    other => {
                        warn!(group = %group.name, "Not delivering a plan while {}", other.name());
                        return;
                    }
                }
            };
            info!(group = %group.name, "All preferences collected, planning");

            let ctx = ToolContext::group(self.clone(), group.clone(), session.clone());
            let context = SummaryContext {
                group_name: group.name.clone(),
                members: DirectoryEntry::roster(group),
                preferences,
                message_limit: self.limiter.plan_message_limit(),
            };
            let result = match self.prompts.render("summary", &context) {
                Ok(prompt) => self.group_turn(&ctx, &prompt).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                error!(group = %group.name, "Plan exchange failed: {:#}", e);
            }

            if ctx.take_pending_plan() {
                continue;
            }
            self.close_delivery(group, session, result.is_ok()).await;
            return;
        }
    }

    /// Return a delivery still open after its exchange to idle
    async fn close_delivery(&self, group: &GroupConfig, session: &SharedSession, exchange_ok: bool) {
        // Err means the exchange already closed it
        let closed = session.lock().await.close_delivery(Utc::now()).ok();
        let Some(stamped) = closed else {
            return;
        };

        if !exchange_ok {
            warn!(group = %group.name, "Plan exchange failed, delivery closed");
        } else {
            warn!(group = %group.name, "Plan exchange ended before the message limit, closing delivery");
        }
        if !stamped {
            info!(group = %group.name, "No plan message went out, no cooldown");
        }
        if let Err(e) = self.commit(session).await {
            error!(group = %group.name, "Failed to persist closed delivery: {}", e);
        }
    }

    pub async fn remember_preference(&self, group: &GroupConfig, member: &Member, preferences: &Preferences) {
        let input = PreferenceInput {
            group_id: group.chat_id.clone(),
            member_id: member.contact.clone(),
            member_name: member.name.clone(),
            availability: preferences.availability.clone(),
            activity: preferences.activity.clone(),
            notes: preferences.notes.clone(),
        };
        if let Err(e) = self.memory.record_preference(input).await {
            warn!(group = %group.name, "Could not remember preference: {}", e);
        }
    }

    pub async fn remember_hangout(&self, group: &GroupConfig, description: &str) {
        if let Err(e) = self.memory.record_hangout(&group.chat_id, &group.name, description).await {
            warn!(group = %group.name, "Could not remember hangout: {}", e);
        }
    }

    /// Group memory, or "no history" when the store is unavailable
    pub async fn recall(&self, group_id: &str, member_id: &str) -> GroupMemory {
        self.memory.query_memory(group_id, member_id).await.unwrap_or_else(|e| {
            warn!(%group_id, "Memory query failed: {}", e);
            GroupMemory::none()
        })
    }

    pub async fn hangout_stats(&self, group_id: &str) -> Option<HangoutStats> {
        match self.memory.hangout_stats(group_id).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(%group_id, "Hangout stats unavailable: {}", e);
                None
            }
        }
    }
}
