//! Session leases: one active turn per session id
//!
//! A lease is held for the lifetime of a [`SessionLease`] guard and released
//! on drop, including when the turn future is cancelled or times out. A second
//! acquire for a held session fails immediately; there is no queueing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::error::{CoordinationError, CoordinationResult};

/// Registry of sessions with a turn in flight
#[derive(Debug, Clone, Default)]
pub struct SessionLeases {
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `session_id`, or fail with `SessionBusy`
    pub fn acquire(&self, session_id: &str) -> CoordinationResult<SessionLease> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !active.insert(session_id.to_string()) {
            return Err(CoordinationError::session_busy(session_id));
        }
        debug!(session_id, "Session lease acquired");
        Ok(SessionLease {
            session_id: session_id.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    /// Whether a turn is currently running for `session_id`
    pub fn is_held(&self, session_id: &str) -> bool {
        self.active
            .lock()
            .map(|a| a.contains(session_id))
            .unwrap_or(false)
    }
}

/// Scoped lease guard
#[derive(Debug)]
pub struct SessionLease {
    session_id: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SessionLease {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        active.remove(&self.session_id);
        debug!(session_id = %self.session_id, "Session lease released");
    }
}
