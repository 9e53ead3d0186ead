//! Turn transition events
//!
//! One event per routing transition, shaped
//! `{session_id, ticket_id, event_type, payload, timestamp}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::state::{EscalationReason, FailureReason, HandlerKind};

/// Transition kinds emitted by the supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEventKind {
    TurnStarted,
    HandlerDispatched,
    HandlerFailed,
    TurnResolved,
    TurnEscalated,
    TurnFailed,
}

impl TurnEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TurnStarted => "turn_started",
            Self::HandlerDispatched => "handler_dispatched",
            Self::HandlerFailed => "handler_failed",
            Self::TurnResolved => "turn_resolved",
            Self::TurnEscalated => "turn_escalated",
            Self::TurnFailed => "turn_failed",
        }
    }

    /// Whether this event ends a turn
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TurnResolved | Self::TurnEscalated | Self::TurnFailed
        )
    }
}

impl std::fmt::Display for TurnEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured transition event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub session_id: String,
    pub ticket_id: String,
    pub event_type: TurnEventKind,
    #[serde(default)]
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

impl TurnEvent {
    pub fn new(
        session_id: impl Into<String>,
        ticket_id: impl Into<String>,
        event_type: TurnEventKind,
        payload: Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            ticket_id: ticket_id.into(),
            event_type,
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn turn_started(session_id: &str, ticket_id: &str, turn: u32, follow_up: bool) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::TurnStarted,
            json!({ "turn": turn, "follow_up": follow_up }),
        )
    }

    pub fn handler_dispatched(
        session_id: &str,
        ticket_id: &str,
        handler: HandlerKind,
        generation: u64,
    ) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::HandlerDispatched,
            json!({ "handler": handler, "generation": generation }),
        )
    }

    /// `code` is the coordination error code, never the raw cause
    pub fn handler_failed(
        session_id: &str,
        ticket_id: &str,
        handler: HandlerKind,
        code: &str,
        failures: u32,
    ) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::HandlerFailed,
            json!({ "handler": handler, "code": code, "failures": failures }),
        )
    }

    pub fn turn_resolved(session_id: &str, ticket_id: &str, dispatches: u32) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::TurnResolved,
            json!({ "dispatches": dispatches }),
        )
    }

    pub fn turn_escalated(
        session_id: &str,
        ticket_id: &str,
        reason: EscalationReason,
        escalation_id: &str,
    ) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::TurnEscalated,
            json!({ "reason": reason, "escalation_id": escalation_id }),
        )
    }

    pub fn turn_failed(session_id: &str, ticket_id: &str, reason: FailureReason) -> Self {
        Self::new(
            session_id,
            ticket_id,
            TurnEventKind::TurnFailed,
            json!({ "reason": reason }),
        )
    }
}
