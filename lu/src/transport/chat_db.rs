//! Messages.app transport
//!
//! Reads the local `chat.db` read-only and sends through AppleScript.
//! `ROWID` of the `message` table is the sequence number.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tokio::process::Command;
use tracing::{debug, error, info};

use super::{InboundMessage, Sequence, Transport, TransportError};
use crate::config::TransportConfig;

const NEW_MESSAGES_SQL: &str = "
    SELECT m.ROWID, COALESCE(h.id, ''), m.text, m.is_from_me
    FROM message m
    JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
    JOIN chat c ON c.ROWID = cmj.chat_id
    LEFT JOIN handle h ON h.ROWID = m.handle_id
    WHERE c.chat_identifier = ?1
      AND m.ROWID > ?2
      AND m.text IS NOT NULL
      AND m.text != ''
    ORDER BY m.ROWID ASC";

const LATEST_SQL: &str = "
    SELECT COALESCE(MAX(m.ROWID), 0)
    FROM message m
    JOIN chat_message_join cmj ON cmj.message_id = m.ROWID
    JOIN chat c ON c.ROWID = cmj.chat_id
    WHERE c.chat_identifier = ?1";

const CHAT_GUID_SQL: &str = "SELECT guid FROM chat WHERE chat_identifier = ?1";

const CHAT_LIST_SQL: &str = "
    SELECT c.chat_identifier, c.display_name,
           (SELECT COUNT(*) FROM chat_handle_join chj WHERE chj.chat_id = c.ROWID)
    FROM chat c
    ORDER BY c.ROWID DESC";

/// A conversation found in the message database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub chat_id: String,
    pub display_name: String,
    pub member_count: i64,
}

/// Transport over the macOS Messages database
pub struct ChatDbTransport {
    db_path: PathBuf,
    osascript: String,
}

impl ChatDbTransport {
    /// Create a new transport from config
    pub fn from_config(config: &TransportConfig) -> Self {
        debug!(db = %config.chat_db.display(), "ChatDbTransport::from_config: called");
        Self::new(&config.chat_db, &config.osascript)
    }

    pub fn new(db_path: impl AsRef<Path>, osascript: impl Into<String>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            osascript: osascript.into(),
        }
    }

    fn open(path: &Path) -> Result<Connection, TransportError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(path, flags)?)
    }

    /// Run a read-only query on a blocking thread
    async fn with_db<T, F>(&self, f: F) -> Result<T, TransportError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, TransportError> + Send + 'static,
    {
        let path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Self::open(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| TransportError::Join(e.to_string()))?
    }

    /// List every chat, newest first
    pub async fn list_chats(&self) -> Result<Vec<ChatSummary>, TransportError> {
        debug!("list_chats: called");
        self.with_db(|conn| {
            let mut stmt = conn.prepare(CHAT_LIST_SQL)?;
            let rows = stmt.query_map([], |row| {
                Ok(ChatSummary {
                    chat_id: row.get(0)?,
                    display_name: row
                        .get::<_, Option<String>>(1)?
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| "(unnamed)".to_string()),
                    member_count: row.get(2)?,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    /// Full chat GUID needed by AppleScript; falls back to the identifier
    async fn chat_guid(&self, chat_id: &str) -> Result<String, TransportError> {
        let id = chat_id.to_string();
        self.with_db(move |conn| {
            let guid: Option<String> = conn
                .query_row(CHAT_GUID_SQL, params![id], |row| row.get(0))
                .optional()?;
            Ok(guid.unwrap_or(id))
        })
        .await
    }

    async fn run_script(&self, target: &str, script: String) -> Result<(), TransportError> {
        debug!(%target, "run_script: called");
        let output = Command::new(&self.osascript).arg("-e").arg(script).output().await?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(%target, %stderr, "osascript send failed");
            Err(TransportError::Send {
                target: target.to_string(),
                message: stderr,
            })
        }
    }
}

/// Escape text for an AppleScript string literal
pub(crate) fn escape_applescript(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn group_send_script(guid: &str, text: &str) -> String {
    format!(
        "tell application \"Messages\"\n  set targetChat to a reference to chat id \"{}\"\n  send \"{}\" to targetChat\nend tell",
        escape_applescript(guid),
        escape_applescript(text)
    )
}

fn direct_send_script(member_id: &str, text: &str) -> String {
    format!(
        "tell application \"Messages\"\n  set targetBuddy to buddy \"{}\" of (service 1 whose service type is iMessage)\n  send \"{}\" to targetBuddy\nend tell",
        escape_applescript(member_id),
        escape_applescript(text)
    )
}

#[async_trait]
impl Transport for ChatDbTransport {
    async fn list_new_messages(
        &self,
        conversation: &str,
        since: Sequence,
    ) -> Result<Vec<InboundMessage>, TransportError> {
        debug!(%conversation, since, "list_new_messages: called");
        let id = conversation.to_string();
        self.with_db(move |conn| {
            let mut stmt = conn.prepare(NEW_MESSAGES_SQL)?;
            let rows = stmt.query_map(params![id, since], |row| {
                Ok(InboundMessage {
                    sequence: row.get(0)?,
                    sender_id: row.get(1)?,
                    text: row.get(2)?,
                    is_self: row.get::<_, i64>(3)? != 0,
                })
            })?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn latest_sequence(&self, conversation: &str) -> Result<Sequence, TransportError> {
        debug!(%conversation, "latest_sequence: called");
        let id = conversation.to_string();
        self.with_db(move |conn| Ok(conn.query_row(LATEST_SQL, params![id], |row| row.get(0))?))
            .await
    }

    async fn send_group_message(&self, group_id: &str, text: &str) -> Result<(), TransportError> {
        let guid = self.chat_guid(group_id).await?;
        info!("Sending to group {}", guid);
        self.run_script(&guid, group_send_script(&guid, text)).await
    }

    async fn send_direct_message(&self, member_id: &str, text: &str) -> Result<(), TransportError> {
        info!("Sending DM to {}", member_id);
        self.run_script(member_id, direct_send_script(member_id, text)).await
    }
}
