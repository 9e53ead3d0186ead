//! Handler deltas: the only way handler output reaches the ticket state
//!
//! Each handler variant writes exactly one tagged [`StateDelta`]. The
//! supervisor stamps it with the generation the handler was dispatched
//! against, producing a [`HandlerDelta`] for [`TicketState::apply_delta`].
//!
//! [`TicketState::apply_delta`]: super::ticket::TicketState::apply_delta

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{
    AccountSnapshot, Classification, EscalationReason, HandlerKind, KnowledgeResult,
    OperationResult,
};

/// Fields the escalation handler contributes to the escalation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationFields {
    /// Reference id handed to the submitter
    pub escalation_id: String,
    /// Summary for the human reviewer
    pub summary: String,
    pub reason: EscalationReason,
    /// Confirmation text for the submitter
    pub confirmation: String,
    pub created_at: DateTime<Utc>,
}

/// Partial state update, one variant per handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum StateDelta {
    /// Classifier output (replaces any previous classification)
    Classification(Classification),
    /// Knowledge handler output
    Knowledge(KnowledgeResult),
    /// Account handler output
    Account {
        snapshot: AccountSnapshot,
        operation: OperationResult,
    },
    /// Escalation handler output
    Escalation(EscalationFields),
}

impl StateDelta {
    /// The only handler allowed to produce this variant
    pub fn handler(&self) -> HandlerKind {
        match self {
            Self::Classification(_) => HandlerKind::Classifier,
            Self::Knowledge(_) => HandlerKind::Knowledge,
            Self::Account { .. } => HandlerKind::AccountOps,
            Self::Escalation(_) => HandlerKind::Escalation,
        }
    }

    /// Whether applying this delta advances the state generation
    pub fn bumps_generation(&self) -> bool {
        !matches!(self, Self::Escalation(_))
    }
}

/// A delta stamped with the generation it was produced against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerDelta {
    /// State generation at dispatch time
    pub base_generation: u64,
    pub update: StateDelta,
    /// Outbound handler text, in emission order
    #[serde(default)]
    pub messages: Vec<String>,
}

impl HandlerDelta {
    pub fn new(base_generation: u64, update: StateDelta, messages: Vec<String>) -> Self {
        Self {
            base_generation,
            update,
            messages,
        }
    }
}
