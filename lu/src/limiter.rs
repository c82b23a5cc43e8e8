//! Outbound rate limits and cooldowns
//!
//! Pure decisions over a session snapshot and a clock reading; callers apply
//! the resulting transitions.

use chrono::{DateTime, Duration, Utc};

use crate::config::LimitsConfig;
use crate::state::{Session, SessionEvent};

/// What to do with an inbound group message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inbound {
    /// Hand it to the group agent
    Forward,
    /// A planning cycle is in flight
    Busy(&'static str),
    /// A plan was just delivered
    Cooldown { remaining_secs: i64 },
}

/// Verdict for a `send_group_message` attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupSend {
    /// Not delivering a plan
    Free,
    /// Plan message `number`; `last` means the quota is used up once sent
    Plan { number: u32, last: bool },
    /// Preferences are still being collected
    Collecting,
    /// The plan already went out; reject and close the cycle
    QuotaReached,
}

#[derive(Debug, Clone)]
pub struct Limiter {
    plan_message_limit: u32,
    cooldown: Duration,
    nudge_interval: Duration,
}

impl Limiter {
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            plan_message_limit: limits.plan_message_limit,
            cooldown: Duration::seconds(limits.cooldown_secs),
            nudge_interval: Duration::hours(limits.nudge_interval_hours),
        }
    }

    pub fn plan_message_limit(&self) -> u32 {
        self.plan_message_limit
    }

    /// Remaining cooldown after the last plan delivery, if any
    pub fn cooldown_remaining(&self, session: &Session, now: DateTime<Utc>) -> Option<Duration> {
        let delivered = session.plan_delivered_at?;
        let remaining = delivered + self.cooldown - now;
        (remaining > Duration::zero()).then_some(remaining)
    }

    pub fn inbound(&self, session: &Session, now: DateTime<Utc>) -> Inbound {
        if !session.is_idle() {
            return Inbound::Busy(session.event.name());
        }
        match self.cooldown_remaining(session, now) {
            Some(remaining) => Inbound::Cooldown {
                remaining_secs: remaining.num_seconds().max(1),
            },
            None => Inbound::Forward,
        }
    }

    /// Classify a group send
    ///
    /// `delivery_closed` is set once the current exchange finished a plan
    /// delivery, so trailing sends in that same exchange are still rejected.
    pub fn group_send(&self, event: &SessionEvent, delivery_closed: bool) -> GroupSend {
        match event {
            SessionEvent::Collecting { .. } => GroupSend::Collecting,
            SessionEvent::Ready { message_count, .. } => {
                if *message_count >= self.plan_message_limit {
                    GroupSend::QuotaReached
                } else {
                    let number = message_count + 1;
                    GroupSend::Plan {
                        number,
                        last: number >= self.plan_message_limit,
                    }
                }
            }
            SessionEvent::Idle if delivery_closed => GroupSend::QuotaReached,
            SessionEvent::Idle => GroupSend::Free,
        }
    }

    /// Days since the last hangout if the group is due a nudge
    ///
    /// Only idle groups outside the cooldown are nudged, at most once per
    /// nudge interval. Without any hangout the clock starts at `bot_start_at`.
    pub fn nudge_due(&self, session: &Session, threshold_days: i64, now: DateTime<Utc>) -> Option<i64> {
        if !session.is_idle() || self.cooldown_remaining(session, now).is_some() {
            return None;
        }
        if let Some(last) = session.last_nudge_at
            && now - last < self.nudge_interval
        {
            return None;
        }

        let since = session
            .last_hangout()
            .map(|h| h.timestamp)
            .or(session.bot_start_at)?;
        let days = (now - since).num_days();
        (days >= threshold_days).then_some(days)
    }
}
