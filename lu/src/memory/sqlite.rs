//! SQLite-backed memory store

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info};

use super::{
    Category, GroupMemory, HangoutEntry, HangoutStats, MemoryError, MemoryStore, PreferenceEntry, PreferenceInput,
    build_group_memory, categorize, streak,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS preferences (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL,
        member_id TEXT NOT NULL,
        member_name TEXT NOT NULL,
        activity TEXT NOT NULL,
        category TEXT NOT NULL,
        availability TEXT NOT NULL,
        notes TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_preferences_member ON preferences(group_id, member_id);
    CREATE INDEX IF NOT EXISTS idx_preferences_created ON preferences(group_id, created_at);

    CREATE TABLE IF NOT EXISTS hangouts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL,
        group_name TEXT NOT NULL,
        description TEXT NOT NULL,
        category TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_hangouts_created ON hangouts(group_id, created_at);
";

/// Memory store in a local SQLite file
pub struct SqliteMemoryStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMemoryStore {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "SqliteMemoryStore::open: called");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        info!("Memory store opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database (for testing)
    pub fn in_memory() -> Result<Self, MemoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on a blocking thread
    async fn with_conn<T, F>(&self, f: F) -> Result<T, MemoryError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, MemoryError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| MemoryError::Poisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| MemoryError::Join(e.to_string()))?
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn load_preferences(conn: &Connection, group_id: &str) -> Result<Vec<PreferenceEntry>, MemoryError> {
    let mut stmt =
        conn.prepare("SELECT member_id, category FROM preferences WHERE group_id = ?1 ORDER BY id DESC")?;
    let rows = stmt.query_map(params![group_id], |row| {
        Ok(PreferenceEntry {
            member_id: row.get(0)?,
            category: Category::parse(&row.get::<_, String>(1)?),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn load_hangouts(conn: &Connection, group_id: &str) -> Result<Vec<HangoutEntry>, MemoryError> {
    let mut stmt =
        conn.prepare("SELECT description, category, created_at FROM hangouts WHERE group_id = ?1 ORDER BY id DESC")?;
    let rows = stmt.query_map(params![group_id], |row| {
        Ok(HangoutEntry {
            description: row.get(0)?,
            category: Category::parse(&row.get::<_, String>(1)?),
            created_at: parse_time(&row.get::<_, String>(2)?),
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn record_preference(&self, input: PreferenceInput) -> Result<(), MemoryError> {
        debug!(group_id = %input.group_id, member_id = %input.member_id, "record_preference: called");
        let category = categorize(&input.activity);
        let now = Utc::now().to_rfc3339();
        info!("Remembered preference for {}: {} -> {}", input.member_name, input.activity, category);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO preferences (group_id, member_id, member_name, activity, category, availability, notes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    input.group_id,
                    input.member_id,
                    input.member_name,
                    input.activity,
                    category.as_str(),
                    input.availability,
                    input.notes,
                    now
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn record_hangout(&self, group_id: &str, group_name: &str, description: &str) -> Result<(), MemoryError> {
        debug!(%group_id, "record_hangout: called");
        let category = categorize(description);
        let now = Utc::now().to_rfc3339();
        let (group_id, group_name, description) = (group_id.to_string(), group_name.to_string(), description.to_string());
        info!("Remembered hangout: {} -> {}", description, category);
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO hangouts (group_id, group_name, description, category, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![group_id, group_name, description, category.as_str(), now],
            )?;
            Ok(())
        })
        .await
    }

    async fn query_memory(&self, group_id: &str, member_id: &str) -> Result<GroupMemory, MemoryError> {
        debug!(%group_id, %member_id, "query_memory: called");
        let (group_id, member_id) = (group_id.to_string(), member_id.to_string());
        self.with_conn(move |conn| {
            let preferences = load_preferences(conn, &group_id)?;
            let hangouts = load_hangouts(conn, &group_id)?;
            Ok(build_group_memory(&preferences, &hangouts, &member_id, Utc::now()))
        })
        .await
    }

    async fn hangout_stats(&self, group_id: &str) -> Result<Option<HangoutStats>, MemoryError> {
        debug!(%group_id, "hangout_stats: called");
        let group_id = group_id.to_string();
        self.with_conn(move |conn| {
            let hangouts = load_hangouts(conn, &group_id)?;
            if hangouts.is_empty() {
                return Ok(None);
            }
            let times: Vec<DateTime<Utc>> = hangouts.iter().map(|h| h.created_at).collect();
            Ok(Some(HangoutStats {
                total_hangouts: hangouts.len(),
                streak: streak(&times, Utc::now()),
            }))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(member: &str, activity: &str) -> PreferenceInput {
        PreferenceInput {
            group_id: "chat1".to_string(),
            member_id: member.to_string(),
            member_name: member.to_string(),
            availability: "Friday 7pm".to_string(),
            activity: activity.to_string(),
            notes: "none".to_string(),
        }
    }

    #[tokio::test]
    async fn test_empty_store_has_no_history() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let memory = store.query_memory("chat1", "+1").await.unwrap();
        assert!(!memory.has_history);
        assert!(store.hangout_stats("chat1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_records_are_scoped_by_group() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store.record_preference(input("+1", "ramen")).await.unwrap();
        store.record_preference(input("+1", "tacos")).await.unwrap();
        store.record_hangout("chat1", "Roommates", "bowling night").await.unwrap();
        store.record_hangout("chat2", "Work", "pub quiz").await.unwrap();

        let memory = store.query_memory("chat1", "+1").await.unwrap();
        assert!(memory.has_history);
        assert_eq!(memory.group_favorites[0].category, Category::Food);
        assert_eq!(memory.group_favorites[0].count, 2);
        assert_eq!(memory.person_always_picks, Some(Category::Food));
        assert_eq!(memory.total_hangouts, 1);
        assert_eq!(memory.streak, 1);

        let last = memory.last_hangout.unwrap();
        assert_eq!(last.description, "bowling night");
        assert_eq!(last.category, Category::Games);
        assert_eq!(last.days_ago, 0);

        let stats = store.hangout_stats("chat2").await.unwrap().unwrap();
        assert_eq!(stats.total_hangouts, 1);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("memory.db");
        let store = SqliteMemoryStore::open(&path).unwrap();
        store.record_hangout("chat1", "Roommates", "picnic").await.unwrap();
        assert!(path.exists());
    }
}
