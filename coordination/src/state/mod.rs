//! Ticket state model
//!
//! The record the supervisor threads through a support session, the
//! tagged deltas handlers return, and the read-only views handlers see.
//!
//! # Usage
//!
//! ```ignore
//! use coordination::state::{HandlerDelta, HandlerKind, StateDelta, TicketState};
//!
//! let mut state = TicketState::create("sess-1", "T-1", "user-1", "chat", "How do I log in?")?;
//! let view = state.view_for(HandlerKind::Classifier).unwrap();
//! // ... run a handler against `view`, then:
//! state.apply_delta(HandlerKind::Classifier, delta)?;
//! ```

pub mod delta;
pub mod ticket;
pub mod types;
pub mod view;

pub use delta::{EscalationFields, HandlerDelta, StateDelta};
pub use ticket::TicketState;
pub use types::{
    AccountOperation, AccountSnapshot, Article, Category, Classification, Decision,
    EscalationReason, FailureReason, HandlerKind, KnowledgeResult, Message, OperationResult,
    ReservationRecord, ReservationStatus, Resolution, ResolutionStatus, Role, SubscriptionRecord,
    SubscriptionStatus, Urgency, UserRecord,
};
pub use view::StateView;
