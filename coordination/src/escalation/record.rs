//! Escalation Record: the durable hand-off written once per escalation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{EscalationFields, EscalationReason, TicketState};

/// Immutable record of a ticket handed to a human reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub escalation_id: String,
    pub session_id: String,
    pub ticket_id: String,
    pub external_user_id: String,
    pub summary: String,
    pub reason: EscalationReason,
    pub created_at: DateTime<Utc>,
}

impl EscalationRecord {
    /// Combine the escalation handler's fields with the ticket identifiers
    pub fn from_fields(state: &TicketState, fields: &EscalationFields) -> Self {
        Self {
            escalation_id: fields.escalation_id.clone(),
            session_id: state.session_id().to_string(),
            ticket_id: state.ticket_id().to_string(),
            external_user_id: state.external_user_id().to_string(),
            summary: fields.summary.clone(),
            reason: fields.reason,
            created_at: fields.created_at,
        }
    }
}

impl std::fmt::Display for EscalationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] ticket {} ({}): {}",
            self.escalation_id, self.ticket_id, self.reason, self.summary
        )
    }
}
