//! Coordination error taxonomy
//!
//! Every failure class the routing core can observe. Only `InvalidInput` and
//! `SessionBusy` are meant to reach a ticket submitter; the rest are absorbed
//! by the supervisor and converted into terminal state transitions.

use thiserror::Error;

use crate::memory::errors::StoreError;
use crate::state::types::{HandlerKind, ResolutionStatus};

/// Result alias for coordination operations
pub type CoordinationResult<T> = Result<T, CoordinationError>;

/// Errors raised by the ticket state model, the stores and the routing loop
#[derive(Error, Debug)]
pub enum CoordinationError {
    /// Malformed identifiers at creation time (no state exists yet)
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A delta produced against a superseded generation
    #[error("Stale delta from {handler}: produced at generation {delta_generation}, state is at {current_generation}")]
    StaleDelta {
        handler: HandlerKind,
        delta_generation: u64,
        current_generation: u64,
    },

    /// Handler-internal fault
    #[error("Handler {handler} failed: {cause}")]
    HandlerExecution { handler: HandlerKind, cause: String },

    /// Another turn already holds the lease for this session
    #[error("Session {session_id} is busy with another turn")]
    SessionBusy { session_id: String },

    /// Internal signal: dispatch budget for this turn is spent
    #[error("Routing budget exceeded after {dispatches} dispatches")]
    RoutingBudgetExceeded { dispatches: u32 },

    /// The turn ran past its deadline
    #[error("Turn exceeded its deadline of {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Resolution status may only move forward out of `pending`
    #[error("Invalid resolution transition from {from} to {to}")]
    InvalidTransition {
        from: ResolutionStatus,
        to: ResolutionStatus,
    },

    /// Session store, history archive or escalation ledger failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl CoordinationError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a handler execution error
    pub fn handler(handler: HandlerKind, cause: impl Into<String>) -> Self {
        Self::HandlerExecution {
            handler,
            cause: cause.into(),
        }
    }

    /// Create a session busy error
    pub fn session_busy(session_id: impl Into<String>) -> Self {
        Self::SessionBusy {
            session_id: session_id.into(),
        }
    }

    /// Whether a caller should see this error directly
    pub fn is_caller_facing(&self) -> bool {
        matches!(self, Self::InvalidInput { .. } | Self::SessionBusy { .. })
    }

    /// Machine-readable code for logs and events
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::StaleDelta { .. } => "STALE_DELTA",
            Self::HandlerExecution { .. } => "HANDLER_EXECUTION",
            Self::SessionBusy { .. } => "SESSION_BUSY",
            Self::RoutingBudgetExceeded { .. } => "ROUTING_BUDGET_EXCEEDED",
            Self::Timeout { .. } => "TIMEOUT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::Store(_) => "STORE",
        }
    }
}
