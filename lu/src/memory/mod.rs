//! Long-term memory of preferences and hangouts
//!
//! Purely additive: the engine records what people asked for and what the
//! group actually did, and agents can query aggregates to personalise
//! suggestions. The engine never depends on memory being available.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::Serialize;
use thiserror::Error;

mod category;
mod sqlite;

pub use category::{Category, categorize};
pub use sqlite::SqliteMemoryStore;

/// Errors from the memory store
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Join(String),

    #[error("Memory store lock poisoned")]
    Poisoned,
}

/// A preference submission to remember
#[derive(Debug, Clone)]
pub struct PreferenceInput {
    pub group_id: String,
    pub member_id: String,
    pub member_name: String,
    pub availability: String,
    pub activity: String,
    pub notes: String,
}

/// A remembered preference
#[derive(Debug, Clone)]
pub struct PreferenceEntry {
    pub member_id: String,
    pub category: Category,
}

/// A remembered hangout
#[derive(Debug, Clone)]
pub struct HangoutEntry {
    pub description: String,
    pub category: Category,
    pub created_at: DateTime<Utc>,
}

/// Category with its occurrence count
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: Category,
    pub count: usize,
}

/// Most recent hangout, relative to now
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastHangout {
    pub description: String,
    pub category: Category,
    pub days_ago: i64,
}

/// Aggregate view used to personalise suggestions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupMemory {
    pub has_history: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group_favorites: Vec<CategoryCount>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub never_tried: Vec<Category>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub person_favorites: Vec<CategoryCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub person_always_picks: Option<Category>,
    pub total_hangouts: usize,
    pub streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_hangout: Option<LastHangout>,
}

impl GroupMemory {
    /// The "no history" answer
    pub fn none() -> Self {
        Self::default()
    }
}

/// Lightweight hangout totals
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HangoutStats {
    pub total_hangouts: usize,
    pub streak: u32,
}

/// Persistent memory consumed by the engine and tools
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Remember a submitted preference (categorised on write)
    async fn record_preference(&self, input: PreferenceInput) -> Result<(), MemoryError>;

    /// Remember a confirmed hangout (categorised on write)
    async fn record_hangout(&self, group_id: &str, group_name: &str, description: &str) -> Result<(), MemoryError>;

    /// Aggregate history for a group, personalised for one member
    async fn query_memory(&self, group_id: &str, member_id: &str) -> Result<GroupMemory, MemoryError>;

    /// Totals for a group, `None` if it never hung out
    async fn hangout_stats(&self, group_id: &str) -> Result<Option<HangoutStats>, MemoryError>;
}

/// Memory store that remembers nothing
pub struct NullMemoryStore;

#[async_trait]
impl MemoryStore for NullMemoryStore {
    async fn record_preference(&self, _input: PreferenceInput) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn record_hangout(&self, _group_id: &str, _group_name: &str, _description: &str) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn query_memory(&self, _group_id: &str, _member_id: &str) -> Result<GroupMemory, MemoryError> {
        Ok(GroupMemory::none())
    }

    async fn hangout_stats(&self, _group_id: &str) -> Result<Option<HangoutStats>, MemoryError> {
        Ok(None)
    }
}

/// Consecutive calendar weeks (Sunday start, UTC) with at least one hangout,
/// counting back from the week containing `now`
pub fn streak(hangouts: &[DateTime<Utc>], now: DateTime<Utc>) -> u32 {
    let days_since_sunday = now.weekday().num_days_from_sunday() as i64;
    let mut week_start = (now.date_naive() - Duration::days(days_since_sunday))
        .and_time(NaiveTime::MIN)
        .and_utc();

    let mut count = 0;
    loop {
        let week_end = week_start + Duration::weeks(1);
        if hangouts.iter().any(|t| *t >= week_start && *t < week_end) {
            count += 1;
            week_start -= Duration::weeks(1);
        } else {
            return count;
        }
    }
}

/// Top three categories by count; ties break by category order
fn top_categories(categories: impl Iterator<Item = Category>) -> Vec<CategoryCount> {
    let mut counts: BTreeMap<Category, usize> = BTreeMap::new();
    for category in categories {
        *counts.entry(category).or_default() += 1;
    }
    let mut ranked: Vec<CategoryCount> = counts
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then(a.category.cmp(&b.category)));
    ranked.truncate(3);
    ranked
}

/// Build the aggregate view from raw history
///
/// `hangouts` may be in any order; the latest by timestamp is reported.
pub fn build_group_memory(
    preferences: &[PreferenceEntry],
    hangouts: &[HangoutEntry],
    member_id: &str,
    now: DateTime<Utc>,
) -> GroupMemory {
    if preferences.is_empty() && hangouts.is_empty() {
        return GroupMemory::none();
    }

    let group_favorites = top_categories(preferences.iter().map(|p| p.category));

    let tried: HashSet<Category> = preferences
        .iter()
        .map(|p| p.category)
        .chain(hangouts.iter().map(|h| h.category))
        .collect();
    let never_tried = Category::ALL.iter().copied().filter(|c| !tried.contains(c)).collect();

    let personal: Vec<Category> = preferences
        .iter()
        .filter(|p| p.member_id == member_id)
        .map(|p| p.category)
        .collect();
    let person_favorites = top_categories(personal.iter().copied());
    let person_always_picks = match personal.split_first() {
        Some((first, rest)) if !rest.is_empty() && rest.iter().all(|c| c == first) => Some(*first),
        _ => None,
    };

    let times: Vec<DateTime<Utc>> = hangouts.iter().map(|h| h.created_at).collect();
    let last_hangout = hangouts.iter().max_by_key(|h| h.created_at).map(|h| LastHangout {
        description: h.description.clone(),
        category: h.category,
        days_ago: (now - h.created_at).num_days(),
    });

    GroupMemory {
        has_history: true,
        group_favorites,
        never_tried,
        person_favorites,
        person_always_picks,
        total_hangouts: hangouts.len(),
        streak: streak(&times, now),
        last_hangout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn pref(member: &str, category: Category) -> PreferenceEntry {
        PreferenceEntry {
            member_id: member.to_string(),
            category,
        }
    }

    fn hangout(description: &str, when: DateTime<Utc>) -> HangoutEntry {
        HangoutEntry {
            description: description.to_string(),
            category: categorize(description),
            created_at: when,
        }
    }

    #[test]
    fn test_streak_counts_consecutive_weeks() {
        // 2026-03-11 is a Wednesday; its week starts Sunday 2026-03-08
        let now = at(2026, 3, 11);
        let hangouts = vec![at(2026, 3, 9), at(2026, 3, 2), at(2026, 2, 22)];
        assert_eq!(streak(&hangouts, now), 3);
    }

    #[test]
    fn test_streak_breaks_on_gap() {
        let now = at(2026, 3, 11);
        // Nothing in the week of 2026-03-01
        let hangouts = vec![at(2026, 3, 8), at(2026, 2, 24)];
        assert_eq!(streak(&hangouts, now), 1);
    }

    #[test]
    fn test_streak_zero_without_current_week() {
        let now = at(2026, 3, 11);
        assert_eq!(streak(&[at(2026, 3, 4)], now), 0);
        assert_eq!(streak(&[], now), 0);
    }

    #[test]
    fn test_streak_sunday_boundary() {
        // Sunday midnight belongs to the new week
        let now = at(2026, 3, 8);
        let sunday_midnight = Utc.with_ymd_and_hms(2026, 3, 8, 0, 0, 0).unwrap();
        let saturday_late = Utc.with_ymd_and_hms(2026, 3, 7, 23, 59, 59).unwrap();
        assert_eq!(streak(&[sunday_midnight], now), 1);
        assert_eq!(streak(&[saturday_late], now), 0);
    }

    #[test]
    fn test_build_group_memory_empty_is_no_history() {
        let memory = build_group_memory(&[], &[], "+1", at(2026, 3, 11));
        assert!(!memory.has_history);
        assert_eq!(memory, GroupMemory::none());
    }

    #[test]
    fn test_build_group_memory_aggregates() {
        let prefs = vec![
            pref("+1", Category::Food),
            pref("+1", Category::Food),
            pref("+2", Category::Movies),
            pref("+2", Category::Food),
            pref("+2", Category::Games),
        ];
        let hangouts = vec![
            hangout("sushi night", at(2026, 3, 1)),
            hangout("hiking trip", at(2026, 3, 9)),
        ];

        let memory = build_group_memory(&prefs, &hangouts, "+1", at(2026, 3, 11));

        assert!(memory.has_history);
        assert_eq!(
            memory.group_favorites[0],
            CategoryCount {
                category: Category::Food,
                count: 3
            }
        );
        assert_eq!(memory.group_favorites.len(), 3);
        assert!(!memory.never_tried.contains(&Category::Outdoors));
        assert!(memory.never_tried.contains(&Category::Nightlife));
        assert_eq!(memory.person_always_picks, Some(Category::Food));
        assert_eq!(memory.total_hangouts, 2);

        let last = memory.last_hangout.unwrap();
        assert_eq!(last.description, "hiking trip");
        assert_eq!(last.days_ago, 2);
    }

    #[test]
    fn test_always_picks_needs_two_matching() {
        let one = vec![pref("+1", Category::Food)];
        assert_eq!(
            build_group_memory(&one, &[], "+1", at(2026, 3, 11)).person_always_picks,
            None
        );

        let mixed = vec![pref("+1", Category::Food), pref("+1", Category::Sports)];
        assert_eq!(
            build_group_memory(&mixed, &[], "+1", at(2026, 3, 11)).person_always_picks,
            None
        );
    }

    #[tokio::test]
    async fn test_null_store_has_no_history() {
        let store = NullMemoryStore;
        assert!(!store.query_memory("chat1", "+1").await.unwrap().has_history);
        assert!(store.hangout_stats("chat1").await.unwrap().is_none());
        store.record_hangout("chat1", "Roommates", "bowling").await.unwrap();
    }
}
