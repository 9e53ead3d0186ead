//! Message log retention: folds the oldest messages into a summary note.
//!
//! The seed message (the submitter's first message) is always kept. When the
//! log grows past `max_messages`, everything between the seed and the newest
//! `max_messages - 2` entries is replaced by one system note that reuses the
//! sequence number of the last message it absorbed, so `seq` stays strictly
//! increasing through the log.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::{Message, Role, TicketState};

/// Smallest log the policy will compact down to: seed + summary + newest
const MIN_RETAINED: usize = 3;

/// Longest excerpt kept per message in the summary note
const EXCERPT_CHARS: usize = 80;

/// Result of one compaction pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactionReport {
    /// Messages folded into the summary
    pub messages_compacted: usize,
    /// Sequence range that was folded (inclusive)
    pub compacted_range: (u64, u64),
}

/// Bound on the message log length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    pub max_messages: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { max_messages: 50 }
    }
}

impl RetentionPolicy {
    pub fn new(max_messages: usize) -> Self {
        Self {
            max_messages: max_messages.max(MIN_RETAINED),
        }
    }

    /// Whether `state` currently exceeds the bound
    pub fn needs_compaction(&self, state: &TicketState) -> bool {
        state.message_log.len() > self.max_messages.max(MIN_RETAINED)
    }

    /// Compact `state`'s log if it exceeds the bound
    pub fn apply(&self, state: &mut TicketState) -> Option<CompactionReport> {
        if !self.needs_compaction(state) {
            return None;
        }
        let max = self.max_messages.max(MIN_RETAINED);
        let keep_tail = max - 2;
        let log = &mut state.message_log;
        let end = log.len() - keep_tail;

        let folded: Vec<Message> = log.drain(1..end).collect();
        let first_seq = folded.first().map(|m| m.seq)?;
        let last_seq = folded.last().map(|m| m.seq)?;

        let mut note = Message::system(summarize(&folded));
        note.seq = last_seq;
        log.insert(1, note);

        debug!(
            session_id = %state.session_id,
            compacted = folded.len(),
            first_seq,
            last_seq,
            "Message log compacted"
        );

        Some(CompactionReport {
            messages_compacted: folded.len(),
            compacted_range: (first_seq, last_seq),
        })
    }
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

fn summarize(folded: &[Message]) -> String {
    let mut lines = vec![format!(
        "[Summary of {} earlier messages]",
        folded.len()
    )];
    for message in folded {
        let who = match (message.role, message.handler) {
            (Role::Handler, Some(handler)) => handler.to_string(),
            (role, _) => role.to_string(),
        };
        lines.push(format!("- {}: {}", who, excerpt(&message.content)));
    }
    lines.join("\n")
}
