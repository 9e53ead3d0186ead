//! Session Store: keyed persistence of in-progress ticket state
//!
//! Two backings: [`InMemorySessionStore`] (process-scoped) and
//! [`FileSessionStore`] (one JSON document per session, survives restarts).
//! `save` replaces the whole document atomically; concurrent saves to the
//! same key are last-writer-wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use super::errors::{StoreError, StoreResult};
use crate::state::TicketState;

/// Keyed load/save of ticket state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a session, failing with [`StoreError::NotFound`] when absent
    async fn load(&self, session_id: &str) -> StoreResult<TicketState>;

    /// Overwrite the stored state for a session
    async fn save(&self, session_id: &str, state: &TicketState) -> StoreResult<()>;

    /// Load a session, mapping `NotFound` to `None`
    async fn find(&self, session_id: &str) -> StoreResult<Option<TicketState>> {
        match self.load(session_id).await {
            Ok(state) => Ok(Some(state)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Process-scoped session store
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, TicketState>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions
    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, session_id: &str) -> StoreResult<TicketState> {
        let sessions = self.sessions.read().map_err(|_| StoreError::LockPoisoned)?;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(session_id.to_string()))
    }

    async fn save(&self, session_id: &str, state: &TicketState) -> StoreResult<()> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        sessions.insert(session_id.to_string(), state.clone());
        Ok(())
    }
}

/// Map an identifier onto a file stem; hex keeps distinct keys distinct
pub(crate) fn file_stem(key: &str) -> String {
    hex::encode(key.as_bytes())
}

/// Durable session store: `<dir>/<session_id>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(session_id)))
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self, session_id: &str) -> StoreResult<TicketState> {
        let path = self.path_for(session_id);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(session_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let state: TicketState = serde_json::from_str(&json)?;
        if state.session_id() != session_id {
            return Err(StoreError::KeyMismatch {
                expected: session_id.to_string(),
                found: state.session_id().to_string(),
            });
        }
        Ok(state)
    }

    async fn save(&self, session_id: &str, state: &TicketState) -> StoreResult<()> {
        let path = self.path_for(session_id);
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            file_stem(session_id),
            uuid::Uuid::new_v4().simple()
        ));
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(session_id, path = %path.display(), "Session saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ResolutionStatus;

    fn state(session_id: &str) -> TicketState {
        TicketState::create(session_id, "T-1", "user-1", "chat", "hello").unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_load_missing() {
        let store = InMemorySessionStore::new();
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.find("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_in_memory_last_writer_wins() {
        let store = InMemorySessionStore::new();
        let mut s = state("sess-1");
        store.save("sess-1", &s).await.unwrap();
        s.allow_auto_resolve();
        s.resolve("answer", "summary").unwrap();
        store.save("sess-1", &s).await.unwrap();

        let loaded = store.load("sess-1").await.unwrap();
        assert_eq!(loaded.status(), ResolutionStatus::Resolved);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("sessions"))
            .await
            .unwrap();
        let s = state("sess/../1");
        store.save("sess/../1", &s).await.unwrap();

        let loaded = store.load("sess/../1").await.unwrap();
        assert_eq!(loaded, s);
        assert!(matches!(
            store.load("other").await.unwrap_err(),
            StoreError::NotFound(_)
        ));

        // No temp files left behind, and nothing escaped the store dir
        let entries: Vec<_> = std::fs::read_dir(store.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(entries, vec![format!("{}.json", hex::encode("sess/../1"))]);
    }

    #[tokio::test]
    async fn test_file_store_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        store.save("sess.1", &state("sess.1")).await.unwrap();

        assert!(store.find("sess_1").await.unwrap().is_none());
        assert_eq!(
            store.load("sess.1").await.unwrap().session_id(),
            "sess.1"
        );
    }

    #[tokio::test]
    async fn test_file_store_rejects_document_for_another_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        store.save("sess-1", &state("sess-1")).await.unwrap();
        std::fs::copy(
            dir.path().join(format!("{}.json", file_stem("sess-1"))),
            dir.path().join(format!("{}.json", file_stem("sess-2"))),
        )
        .unwrap();

        assert!(matches!(
            store.load("sess-2").await.unwrap_err(),
            StoreError::KeyMismatch { .. }
        ));
    }

    #[tokio::test]
    async fn test_file_store_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        std::fs::write(
            dir.path().join(format!("{}.json", file_stem("bad"))),
            "{not json",
        )
        .unwrap();
        assert!(matches!(
            store.load("bad").await.unwrap_err(),
            StoreError::Json(_)
        ));
    }
}
