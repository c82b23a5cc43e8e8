//! StateManager - actor that owns the session file
//!
//! Every save rewrites the whole file through a temp file and a rename, so a
//! crash leaves either the old or the new map on disk, never half of one.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::messages::{StateCommand, StateError, StateResponse};
use super::session::Session;

/// On-disk layout: one record per deployment
#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    sessions: BTreeMap<String, Session>,
}

/// Read the session file without taking the lock
///
/// Used by read-only commands while a daemon may be running.
pub fn load_sessions(path: impl AsRef<Path>) -> StateResponse<BTreeMap<String, Session>> {
    let path = path.as_ref();
    debug!(path = %path.display(), "load_sessions: called");
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let file: StateFile = serde_json::from_str(&content)?;
    Ok(file.sessions)
}

/// Session map plus the lock that makes this process its only writer
struct SessionStore {
    path: PathBuf,
    sessions: BTreeMap<String, Session>,
    lock_path: PathBuf,
    _lock: File,
}

impl SessionStore {
    fn open(path: &Path) -> StateResponse<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let lock_path = path.with_extension("lock");
        let lock = OpenOptions::new().write(true).create(true).truncate(false).open(&lock_path)?;
        lock.try_lock_exclusive()
            .map_err(|_| StateError::Locked(path.display().to_string()))?;

        let sessions = load_sessions(path)?;
        info!(count = sessions.len(), "Loaded sessions from {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            sessions,
            lock_path,
            _lock: lock,
        })
    }

    fn save(&mut self, session: Session) -> StateResponse<()> {
        self.sessions.insert(session.group_id.clone(), session);
        self.flush()
    }

    fn flush(&self) -> StateResponse<()> {
        let file = StateFile {
            sessions: self.sessions.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut out = File::create(&tmp)?;
            out.write_all(json.as_bytes())?;
            out.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor
    ///
    /// Fails if the file is corrupt or another process holds its lock.
    pub fn spawn(state_path: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(state_path = %state_path.as_ref().display(), "spawn: called");
        let store = SessionStore::open(state_path.as_ref())?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");
        Ok(Self { tx })
    }

    /// Get the session for a group, `None` if never seen
    pub async fn get_session(&self, group_id: &str) -> StateResponse<Option<Session>> {
        debug!(%group_id, "get_session: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::GetSession {
                group_id: group_id.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Insert or replace a session and persist the whole map
    pub async fn save_session(&self, session: Session) -> StateResponse<()> {
        debug!(group_id = %session.group_id, event = session.event.name(), "save_session: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::SaveSession {
                session,
                reply: reply_tx,
            })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// All sessions, ordered by group id
    pub async fn list_sessions(&self) -> StateResponse<Vec<Session>> {
        debug!("list_sessions: called");
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(StateCommand::ListSessions { reply: reply_tx })
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

async fn actor_loop(mut store: SessionStore, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("actor_loop: called");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::GetSession { group_id, reply } => {
                debug!(%group_id, "actor_loop: GetSession command");
                let _ = reply.send(Ok(store.sessions.get(&group_id).cloned()));
            }

            StateCommand::SaveSession { session, reply } => {
                debug!(group_id = %session.group_id, "actor_loop: SaveSession command");
                let result = store.save(session);
                if let Err(e) = &result {
                    error!(error = %e, "Failed to persist sessions");
                }
                let _ = reply.send(result);
            }

            StateCommand::ListSessions { reply } => {
                debug!("actor_loop: ListSessions command");
                let _ = reply.send(Ok(store.sessions.values().cloned().collect()));
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_and_get() {
        let temp = tempdir().unwrap();
        let manager = StateManager::spawn(temp.path().join("state.json")).unwrap();

        assert!(manager.get_session("chat1").await.unwrap().is_none());

        let mut session = Session::new("chat1", Utc::now());
        session.bookmarks.last_cursor = Some(7);
        manager.save_session(session.clone()).await.unwrap();

        let loaded = manager.get_session("chat1").await.unwrap().unwrap();
        assert_eq!(loaded, session);
        assert_eq!(manager.list_sessions().await.unwrap().len(), 1);

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_every_save_rewrites_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        let manager = StateManager::spawn(&path).unwrap();

        manager.save_session(Session::new("chat1", Utc::now())).await.unwrap();
        manager.save_session(Session::new("chat2", Utc::now())).await.unwrap();

        let on_disk = load_sessions(&path).unwrap();
        assert_eq!(on_disk.keys().cloned().collect::<Vec<_>>(), vec!["chat1", "chat2"]);
        assert!(!path.with_extension("json.tmp").exists());

        manager.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_writer_is_locked_out() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        let _manager = StateManager::spawn(&path).unwrap();

        let err = SessionStore::open(&path).err().unwrap();
        assert!(matches!(err, StateError::Locked(_)));
    }

    #[tokio::test]
    async fn test_corrupt_file_fails_spawn() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        fs::write(&path, "{not json").unwrap();

        assert!(StateManager::spawn(&path).is_err());
    }

    #[test]
    fn test_load_sessions_missing_or_empty() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("state.json");
        assert!(load_sessions(&path).unwrap().is_empty());

        fs::write(&path, "  \n").unwrap();
        assert!(load_sessions(&path).unwrap().is_empty());
    }
}
