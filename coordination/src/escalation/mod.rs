//! Escalation: deterministic routing policy for support tickets
//!
//! Decides, for a pending ticket, whether the supervisor should run another
//! handler, resolve automatically, or hand the ticket to a human. This is a
//! pure decision layer with no handler calls.
//!
//! # Override ladder
//!
//! ```text
//! blocked_account            (hard trigger, always wins)
//!     │
//! refund_or_dispute          (category override)
//!     │
//! critical_urgency           (opt-in)
//!     │
//! handler_recommendation     (classifier asked for a human)
//!     │
//! low_confidence             (knowledge answer below threshold)
//!     │
//! no_resolution_path         (every handler ran, nothing resolved)
//! ```
//!
//! `handler_failure` and `routing_budget_exceeded` are raised by the
//! supervisor's turn budget rather than by ticket content.

pub mod heuristics;
pub mod policy;
pub mod record;

pub use heuristics::HistoryInsight;
pub use policy::{PolicyConfig, ResolutionPath, RouteDecision, RoutingPolicy, TurnLedger};
pub use record::EscalationRecord;
