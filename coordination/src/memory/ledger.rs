//! Escalation Ledger: durable store of escalation records
//!
//! Records are immutable and written once; a second write with the same
//! `escalation_id` is a no-op.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::errors::{StoreError, StoreResult};
use crate::escalation::EscalationRecord;

/// Append-once store of escalation records
#[async_trait]
pub trait EscalationLedger: Send + Sync {
    /// Persist a record; returns `false` when the id was already recorded
    async fn record(&self, record: EscalationRecord) -> StoreResult<bool>;

    /// All records for a session, oldest first
    async fn for_session(&self, session_id: &str) -> StoreResult<Vec<EscalationRecord>>;
}

/// Process-scoped ledger
#[derive(Debug, Default)]
pub struct InMemoryEscalationLedger {
    records: RwLock<Vec<EscalationRecord>>,
}

impl InMemoryEscalationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first
    pub fn all(&self) -> StoreResult<Vec<EscalationRecord>> {
        Ok(self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }
}

#[async_trait]
impl EscalationLedger for InMemoryEscalationLedger {
    async fn record(&self, record: EscalationRecord) -> StoreResult<bool> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        if records
            .iter()
            .any(|r| r.escalation_id == record.escalation_id)
        {
            return Ok(false);
        }
        records.push(record);
        Ok(true)
    }

    async fn for_session(&self, session_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(records
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// Durable ledger: a single JSONL file
#[derive(Debug)]
pub struct FileEscalationLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileEscalationLedger {
    /// Open (or lazily create) the ledger file at `path`
    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> StoreResult<Vec<EscalationRecord>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Skipping malformed ledger line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl EscalationLedger for FileEscalationLedger {
    async fn record(&self, record: EscalationRecord) -> StoreResult<bool> {
        let _guard = self.write_lock.lock().await;
        if self
            .read_all()
            .await?
            .iter()
            .any(|r| r.escalation_id == record.escalation_id)
        {
            return Ok(false);
        }
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn for_session(&self, session_id: &str) -> StoreResult<Vec<EscalationRecord>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }
}
