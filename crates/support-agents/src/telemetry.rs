//! Structured telemetry for support turns.
//!
//! Turn events are appended to a JSONL file, one complete event per line,
//! by a background task draining an event bus subscription. The routing
//! loop only publishes to the bus; writes are best-effort and failures are
//! logged.

use std::path::{Path, PathBuf};

use coordination::TurnEvent;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Appends turn events to a JSONL file.
#[derive(Debug, Clone)]
pub struct JsonlTelemetry {
    path: PathBuf,
}

impl JsonlTelemetry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event; returns whether the line was written
    pub async fn append(&self, event: &TurnEvent) -> bool {
        let mut line = match serde_json::to_vec(event) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize turn event: {e}");
                return false;
            }
        };
        line.push(b'\n');
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!("Failed to create telemetry directory: {e}");
                return false;
            }
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                warn!("Failed to open telemetry file: {e}");
                return false;
            }
        };
        match file.write_all(&line).await {
            Ok(()) => file.flush().await.is_ok(),
            Err(e) => {
                warn!("Failed to append telemetry: {e}");
                false
            }
        }
    }

    /// Drain `receiver` into the file until the bus closes.
    ///
    /// The task resolves to the number of events written. Lagged events
    /// are skipped with a warning.
    pub fn spawn(self, mut receiver: broadcast::Receiver<TurnEvent>) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut written = 0;
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if self.append(&event).await {
                            written += 1;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Telemetry subscriber lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(path = %self.path.display(), written, "Telemetry writer stopped");
            written
        })
    }
}

/// Read every event from a telemetry file, skipping malformed lines
pub fn read_events(path: &Path) -> std::io::Result<Vec<TurnEvent>> {
    let contents = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for line in contents.lines().filter(|l| !l.trim().is_empty()) {
        match serde_json::from_str::<TurnEvent>(line) {
            Ok(event) => events.push(event),
            Err(e) => warn!("Skipping malformed telemetry line: {e}"),
        }
    }
    Ok(events)
}
