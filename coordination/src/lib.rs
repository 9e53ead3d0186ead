//! Support Ticket Coordination Library
//!
//! The deterministic core of the support orchestrator:
//! - Ticket state model with generation-checked handler deltas
//! - Routing policy deciding dispatch, resolution or escalation
//! - Session store, history archive and escalation ledger contracts
//! - Per-session turn leases and message log retention
//! - Turn transition events over a broadcast bus
//!
//! Handler intelligence (classification, retrieval, account operations)
//! and the async routing loop live in the `support-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod error;
pub mod escalation;
pub mod events;
pub mod memory;
pub mod state;

pub use error::{CoordinationError, CoordinationResult};
pub use escalation::{
    EscalationRecord, HistoryInsight, PolicyConfig, ResolutionPath, RouteDecision, RoutingPolicy,
    TurnLedger,
};
pub use events::{EventBus, EventSink, SharedEventBus, TurnEvent, TurnEventKind};
pub use memory::{
    EscalationLedger, FileEscalationLedger, FileHistoryArchive, FileSessionStore, HistoryArchive,
    HistoryEntry, InMemoryEscalationLedger, InMemoryHistoryArchive, InMemorySessionStore,
    RecentEntries, RetentionPolicy, SessionLease, SessionLeases, SessionStore, StoreError,
};
pub use state::{
    EscalationFields, HandlerDelta, HandlerKind, ResolutionStatus, StateDelta, StateView,
    TicketState,
};
