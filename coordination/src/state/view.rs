//! Read-only projections of the ticket state, one per handler variant

use super::ticket::TicketState;
use super::types::{Classification, HandlerKind, Message, Role};

/// What a handler is allowed to read
#[derive(Debug, Clone, Copy)]
pub enum StateView<'a> {
    Classifier {
        message_log: &'a [Message],
    },
    Knowledge {
        message_log: &'a [Message],
        classification: &'a Classification,
    },
    AccountOps {
        message_log: &'a [Message],
        classification: &'a Classification,
        external_user_id: &'a str,
    },
    Escalation {
        state: &'a TicketState,
    },
}

impl<'a> StateView<'a> {
    /// Handler this view was projected for
    pub fn handler(&self) -> HandlerKind {
        match self {
            Self::Classifier { .. } => HandlerKind::Classifier,
            Self::Knowledge { .. } => HandlerKind::Knowledge,
            Self::AccountOps { .. } => HandlerKind::AccountOps,
            Self::Escalation { .. } => HandlerKind::Escalation,
        }
    }

    /// Message log (every variant may read it)
    pub fn message_log(&self) -> &'a [Message] {
        match self {
            Self::Classifier { message_log }
            | Self::Knowledge { message_log, .. }
            | Self::AccountOps { message_log, .. } => message_log,
            Self::Escalation { state } => &state.message_log,
        }
    }

    /// Classification, when the variant exposes it
    pub fn classification(&self) -> Option<&'a Classification> {
        match self {
            Self::Classifier { .. } => None,
            Self::Knowledge { classification, .. } | Self::AccountOps { classification, .. } => {
                Some(classification)
            }
            Self::Escalation { state } => state.classification.as_ref(),
        }
    }

    /// Most recent user message
    pub fn latest_user_message(&self) -> Option<&'a Message> {
        self.message_log()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
    }

    /// All user text joined in causal order
    pub fn user_text(&self) -> String {
        self.message_log()
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
