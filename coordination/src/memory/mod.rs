//! Session memory: short-lived session state and long-term user history.
//!
//! # Modules
//!
//! - [`session`]: SessionStore trait, in-memory and file backings
//! - [`history`]: HistoryArchive trait, HistoryEntry, RecentEntries
//! - [`ledger`]: EscalationLedger trait for escalation records
//! - [`lease`]: per-session turn leases
//! - [`retention`]: message log compaction into summary notes
//! - [`errors`]: StoreError taxonomy

pub mod errors;
pub mod history;
pub mod lease;
pub mod ledger;
pub mod retention;
pub mod session;

pub use errors::{StoreError, StoreResult};
pub use history::{
    FileHistoryArchive, HistoryArchive, HistoryEntry, InMemoryHistoryArchive, RecentEntries,
};
pub use lease::{SessionLease, SessionLeases};
pub use ledger::{EscalationLedger, FileEscalationLedger, InMemoryEscalationLedger};
pub use retention::{CompactionReport, RetentionPolicy};
pub use session::{FileSessionStore, InMemorySessionStore, SessionStore};
