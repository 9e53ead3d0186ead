//! History Archive: append-only long-term record of prior tickets per user
//!
//! `append` is idempotent per `ticket_id`; `recent` yields entries
//! most-recent-first through [`RecentEntries`], a snapshot that can be
//! iterated any number of times without copying the entries.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::errors::{StoreError, StoreResult};
use super::session::file_stem;
use crate::state::{Category, EscalationReason, ResolutionStatus, TicketState};

/// One archived ticket outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ticket_id: String,
    pub session_id: String,
    /// Terminal status at the time of writing
    pub status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// Build the entry for a ticket that just reached a terminal status
    pub fn from_state(state: &TicketState) -> Self {
        Self {
            ticket_id: state.ticket_id().to_string(),
            session_id: state.session_id().to_string(),
            status: state.status(),
            category: state.classification().map(|c| c.category),
            escalation_reason: state.decision().escalation_reason,
            summary: state
                .resolution()
                .summary
                .clone()
                .unwrap_or_else(|| state.status().to_string()),
            timestamp: Utc::now(),
        }
    }
}

/// Most-recent-first view over a user's history
#[derive(Debug, Clone, Default)]
pub struct RecentEntries {
    /// Chronological snapshot
    entries: Arc<Vec<HistoryEntry>>,
    limit: usize,
}

impl RecentEntries {
    fn new(entries: Arc<Vec<HistoryEntry>>, limit: usize) -> Self {
        Self { entries, limit }
    }

    /// Iterate newest first; each call starts over
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.entries.iter().rev().take(self.limit)
    }

    pub fn len(&self) -> usize {
        self.entries.len().min(self.limit)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<'a> IntoIterator for &'a RecentEntries {
    type Item = &'a HistoryEntry;
    type IntoIter = std::iter::Take<std::iter::Rev<std::slice::Iter<'a, HistoryEntry>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter().rev().take(self.limit)
    }
}

/// Append/query interface over per-user ticket history
#[async_trait]
pub trait HistoryArchive: Send + Sync {
    /// Append an entry; returns `false` when the ticket was already archived
    async fn append(&self, external_user_id: &str, entry: HistoryEntry) -> StoreResult<bool>;

    /// The `limit` most recent entries for a user, newest first
    async fn recent(&self, external_user_id: &str, limit: usize) -> StoreResult<RecentEntries>;
}

/// Process-scoped history archive
#[derive(Debug, Default)]
pub struct InMemoryHistoryArchive {
    users: RwLock<HashMap<String, Arc<Vec<HistoryEntry>>>>,
}

impl InMemoryHistoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryArchive for InMemoryHistoryArchive {
    async fn append(&self, external_user_id: &str, entry: HistoryEntry) -> StoreResult<bool> {
        let mut users = self.users.write().map_err(|_| StoreError::LockPoisoned)?;
        let entries = users.entry(external_user_id.to_string()).or_default();
        if entries.iter().any(|e| e.ticket_id == entry.ticket_id) {
            return Ok(false);
        }
        Arc::make_mut(entries).push(entry);
        Ok(true)
    }

    async fn recent(&self, external_user_id: &str, limit: usize) -> StoreResult<RecentEntries> {
        let users = self.users.read().map_err(|_| StoreError::LockPoisoned)?;
        let entries = users.get(external_user_id).cloned().unwrap_or_default();
        Ok(RecentEntries::new(entries, limit))
    }
}

/// Durable history archive: one JSON line per entry in `<dir>/<user>.jsonl`
#[derive(Debug)]
pub struct FileHistoryArchive {
    dir: PathBuf,
    /// Serializes the read-check-append sequence
    write_lock: Mutex<()>,
}

impl FileHistoryArchive {
    /// Open an archive rooted at `dir`, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, external_user_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.jsonl", file_stem(external_user_id)))
    }

    async fn read_all(&self, external_user_id: &str) -> StoreResult<Vec<HistoryEntry>> {
        let path = self.path_for(external_user_id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed history line"
                ),
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl HistoryArchive for FileHistoryArchive {
    async fn append(&self, external_user_id: &str, entry: HistoryEntry) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        let existing = self.read_all(external_user_id).await?;
        if existing.iter().any(|e| e.ticket_id == entry.ticket_id) {
            debug!(
                user = external_user_id,
                ticket_id = %entry.ticket_id,
                "History entry already archived"
            );
            return Ok(false);
        }

        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(external_user_id))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn recent(&self, external_user_id: &str, limit: usize) -> StoreResult<RecentEntries> {
        let entries = self.read_all(external_user_id).await?;
        Ok(RecentEntries::new(Arc::new(entries), limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticket_id: &str, status: ResolutionStatus) -> HistoryEntry {
        HistoryEntry {
            ticket_id: ticket_id.to_string(),
            session_id: format!("sess-{}", ticket_id),
            status,
            category: Some(Category::Technical),
            escalation_reason: None,
            summary: format!("summary for {}", ticket_id),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_append_is_idempotent_per_ticket() {
        let archive = InMemoryHistoryArchive::new();
        assert!(archive
            .append("user-1", entry("T-1", ResolutionStatus::Resolved))
            .await
            .unwrap());
        assert!(!archive
            .append("user-1", entry("T-1", ResolutionStatus::Escalated))
            .await
            .unwrap());

        let recent = archive.recent("user-1", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(
            recent.iter().next().unwrap().status,
            ResolutionStatus::Resolved
        );
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_restartable() {
        let archive = InMemoryHistoryArchive::new();
        for id in ["T-1", "T-2", "T-3"] {
            archive
                .append("user-1", entry(id, ResolutionStatus::Resolved))
                .await
                .unwrap();
        }
        let recent = archive.recent("user-1", 2).await.unwrap();
        let first: Vec<&str> = recent.iter().map(|e| e.ticket_id.as_str()).collect();
        assert_eq!(first, vec!["T-3", "T-2"]);
        let second: Vec<&str> = (&recent).into_iter().map(|e| e.ticket_id.as_str()).collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_recent_unknown_user_is_empty() {
        let archive = InMemoryHistoryArchive::new();
        assert!(archive.recent("ghost", 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_snapshot_unaffected_by_later_appends() {
        let archive = InMemoryHistoryArchive::new();
        archive
            .append("user-1", entry("T-1", ResolutionStatus::Resolved))
            .await
            .unwrap();
        let snapshot = archive.recent("user-1", 5).await.unwrap();
        archive
            .append("user-1", entry("T-2", ResolutionStatus::Escalated))
            .await
            .unwrap();
        assert_eq!(snapshot.len(), 1);
    }

    #[tokio::test]
    async fn test_file_archive_persists_and_dedupes() {
        let dir = tempfile::tempdir().unwrap();
        {
            let archive = FileHistoryArchive::open(dir.path()).await.unwrap();
            assert!(archive
                .append("user-1", entry("T-1", ResolutionStatus::Escalated))
                .await
                .unwrap());
            assert!(archive
                .append("user-1", entry("T-2", ResolutionStatus::Resolved))
                .await
                .unwrap());
        }

        let reopened = FileHistoryArchive::open(dir.path()).await.unwrap();
        assert!(!reopened
            .append("user-1", entry("T-1", ResolutionStatus::Resolved))
            .await
            .unwrap());
        let recent = reopened.recent("user-1", 10).await.unwrap();
        let ids: Vec<&str> = recent.iter().map(|e| e.ticket_id.as_str()).collect();
        assert_eq!(ids, vec!["T-2", "T-1"]);
    }

    #[tokio::test]
    async fn test_file_archive_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileHistoryArchive::open(dir.path()).await.unwrap();
        archive
            .append("user-1", entry("T-1", ResolutionStatus::Resolved))
            .await
            .unwrap();
        let path = dir.path().join(format!("{}.jsonl", file_stem("user-1")));
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("garbage\n");
        std::fs::write(&path, text).unwrap();

        assert_eq!(archive.recent("user-1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_file_archive_keeps_similar_users_apart() {
        let dir = tempfile::tempdir().unwrap();
        let archive = FileHistoryArchive::open(dir.path()).await.unwrap();
        assert!(archive
            .append("alice.smith", entry("T-1", ResolutionStatus::Escalated))
            .await
            .unwrap());

        assert!(archive.recent("alice_smith", 10).await.unwrap().is_empty());
        assert!(archive
            .append("alice_smith", entry("T-1", ResolutionStatus::Resolved))
            .await
            .unwrap());
        assert_eq!(archive.recent("alice.smith", 10).await.unwrap().len(), 1);
    }
}
