//! Collaborator seams: credential store, session store, frame sink
//!
//! The core consumes these through trait objects; production deployments
//! supply database-backed implementations. The in-memory variants here
//! back the default binary and the test suite.

use crate::session::SessionRecord;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    /// An identity with this name already exists
    #[error("Duplicate identity")]
    Duplicate,

    #[error("Store failure: {0}")]
    Internal(String),
}

/// A registered account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub password: String,
    pub last_login: Option<u64>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id,
            name: self.name.clone(),
        }
    }
}

/// Public view of an account, safe to hand to observers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: u64,
    pub name: String,
}

/// Credential lookup and creation
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, name: &str) -> Result<Option<User>, StoreError>;

    /// Create a new identity; `StoreError::Duplicate` on name conflict
    async fn create(&self, name: &str, password: &str) -> Result<User, StoreError>;
}

/// Login metadata persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn persist_login(&self, record: &SessionRecord) -> Result<(), StoreError>;

    async fn touch_last_login(&self, user_id: u64, at_ms: u64) -> Result<(), StoreError>;
}

/// Destination for received screen frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn store_frame(&self, session_id: Uuid, bytes: &[u8]) -> Result<(), StoreError>;
}

/// In-memory credential store
pub struct MemoryUserStore {
    users: DashMap<String, User>,
    next_id: AtomicU64,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryUserStore {
    async fn find_by_username(&self, name: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(name).map(|entry| entry.clone()))
    }

    async fn create(&self, name: &str, password: &str) -> Result<User, StoreError> {
        let user = User {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            password: password.to_string(),
            last_login: None,
        };
        // Entry API keeps the existence check and insert atomic.
        match self.users.entry(name.to_string()) {
            dashmap::Entry::Occupied(_) => Err(StoreError::Duplicate),
            dashmap::Entry::Vacant(vacant) => {
                vacant.insert(user.clone());
                Ok(user)
            }
        }
    }
}

/// In-memory login metadata store
pub struct MemorySessionStore {
    records: DashMap<Uuid, SessionRecord>,
    last_logins: DashMap<u64, u64>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            last_logins: DashMap::new(),
        }
    }

    pub fn login_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn persist_login(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.records.insert(record.session_id, record.clone());
        Ok(())
    }

    async fn touch_last_login(&self, user_id: u64, at_ms: u64) -> Result<(), StoreError> {
        self.last_logins.insert(user_id, at_ms);
        Ok(())
    }
}

/// In-memory frame sink, keeps every frame per session
pub struct MemoryFrameSink {
    frames: DashMap<Uuid, Vec<Vec<u8>>>,
}

impl MemoryFrameSink {
    pub fn new() -> Self {
        Self {
            frames: DashMap::new(),
        }
    }

    pub fn frames_for(&self, session_id: Uuid) -> Vec<Vec<u8>> {
        self.frames
            .get(&session_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryFrameSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameSink for MemoryFrameSink {
    async fn store_frame(&self, session_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        self.frames
            .entry(session_id)
            .or_default()
            .push(bytes.to_vec());
        Ok(())
    }
}

/// Frame sink that writes each frame under
/// `<base>/<session-id>/<millis>.png`
pub struct FsFrameSink {
    base: PathBuf,
}

impl FsFrameSink {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl FrameSink for FsFrameSink {
    async fn store_frame(&self, session_id: Uuid, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.base.join(session_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let path = dir.join(format!("{now_ms}.png"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryUserStore::new();
        let user = store.create("alice", "longenoughpw").await.unwrap();
        assert_eq!(user.id, 1);

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found, user);
        assert!(store.find_by_username("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = MemoryUserStore::new();
        store.create("alice", "longenoughpw").await.unwrap();
        assert!(matches!(
            store.create("alice", "otherpassword").await,
            Err(StoreError::Duplicate)
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_session_store_tracks_logins() {
        let store = MemorySessionStore::new();
        assert_eq!(store.login_count(), 0);

        let record = SessionRecord {
            session_id: Uuid::new_v4(),
            user_id: 1,
            ip: "127.0.0.1".to_string(),
            client_id: "AA:BB:CC:DD:EE:FF".to_string(),
            login_time_ms: 1_700_000_000_000,
        };
        store.persist_login(&record).await.unwrap();
        store.touch_last_login(1, record.login_time_ms).await.unwrap();
        assert_eq!(store.login_count(), 1);
    }

    #[tokio::test]
    async fn test_fs_frame_sink_writes() {
        let dir = std::env::temp_dir().join(format!("vigil-sink-{}", Uuid::new_v4()));
        let sink = FsFrameSink::new(&dir);
        let session = Uuid::new_v4();

        sink.store_frame(session, b"png bytes").await.unwrap();

        let session_dir = dir.join(session.to_string());
        let mut entries = tokio::fs::read_dir(&session_dir).await.unwrap();
        let entry = entries.next_entry().await.unwrap().unwrap();
        assert_eq!(
            tokio::fs::read(entry.path()).await.unwrap(),
            b"png bytes"
        );

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
