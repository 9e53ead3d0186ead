//! Ticket State: the record threaded through one support session
//!
//! Identifiers are fixed at creation. Handler output enters only through
//! [`TicketState::apply_delta`]; policy fields (`decision`) and terminal
//! transitions are written only by the supervisor through the dedicated
//! methods below. The resolution status moves forward exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::delta::{EscalationFields, HandlerDelta, StateDelta};
use super::types::{
    AccountSnapshot, Classification, Decision, EscalationReason, FailureReason, HandlerKind,
    KnowledgeResult, Message, OperationResult, Resolution, ResolutionStatus,
};
use super::view::StateView;
use crate::error::{CoordinationError, CoordinationResult};

/// Full state for a single support session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketState {
    pub(crate) session_id: String,
    pub(crate) ticket_id: String,
    pub(crate) external_user_id: String,
    pub(crate) channel: String,
    pub(crate) message_log: Vec<Message>,
    pub(crate) next_seq: u64,
    pub(crate) classification: Option<Classification>,
    pub(crate) knowledge_result: Option<KnowledgeResult>,
    pub(crate) account_snapshot: Option<AccountSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) last_operation: Option<OperationResult>,
    /// Handlers run during the current turn, in dispatch order
    pub(crate) handlers_invoked: Vec<HandlerKind>,
    pub(crate) decision: Decision,
    pub(crate) resolution: Resolution,
    /// Incremented on every classification/knowledge/account update
    pub(crate) generation: u64,
    /// 1-indexed turn counter
    pub(crate) turn: u32,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

fn require_identifier(field: &str, value: &str) -> CoordinationResult<()> {
    if value.trim().is_empty() {
        return Err(CoordinationError::invalid_input(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

impl TicketState {
    /// Create the state for a new session, seeded with the submitter's first message
    pub fn create(
        session_id: impl Into<String>,
        ticket_id: impl Into<String>,
        external_user_id: impl Into<String>,
        channel: impl Into<String>,
        initial_message: impl Into<String>,
    ) -> CoordinationResult<Self> {
        let session_id = session_id.into();
        let ticket_id = ticket_id.into();
        let external_user_id = external_user_id.into();
        let initial_message = initial_message.into();

        require_identifier("session_id", &session_id)?;
        require_identifier("ticket_id", &ticket_id)?;
        require_identifier("external_user_id", &external_user_id)?;
        if initial_message.trim().is_empty() {
            return Err(CoordinationError::invalid_input(
                "initial message must not be empty",
            ));
        }

        let now = Utc::now();
        let mut state = Self {
            session_id,
            ticket_id,
            external_user_id,
            channel: channel.into(),
            message_log: Vec::new(),
            next_seq: 1,
            classification: None,
            knowledge_result: None,
            account_snapshot: None,
            last_operation: None,
            handlers_invoked: Vec::new(),
            decision: Decision::default(),
            resolution: Resolution::default(),
            generation: 0,
            turn: 1,
            created_at: now,
            updated_at: now,
        };
        state.push_message(Message::user(initial_message));
        Ok(state)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn ticket_id(&self) -> &str {
        &self.ticket_id
    }

    pub fn external_user_id(&self) -> &str {
        &self.external_user_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn message_log(&self) -> &[Message] {
        &self.message_log
    }

    pub fn classification(&self) -> Option<&Classification> {
        self.classification.as_ref()
    }

    pub fn knowledge_result(&self) -> Option<&KnowledgeResult> {
        self.knowledge_result.as_ref()
    }

    pub fn account_snapshot(&self) -> Option<&AccountSnapshot> {
        self.account_snapshot.as_ref()
    }

    pub fn last_operation(&self) -> Option<&OperationResult> {
        self.last_operation.as_ref()
    }

    pub fn handlers_invoked(&self) -> &[HandlerKind] {
        &self.handlers_invoked
    }

    pub fn decision(&self) -> &Decision {
        &self.decision
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn status(&self) -> ResolutionStatus {
        self.resolution.status
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Whether the account handler reported a blocked account
    pub fn is_blocked(&self) -> bool {
        self.account_snapshot
            .as_ref()
            .map(|a| a.is_blocked)
            .unwrap_or(false)
    }

    /// How many times `handler` ran during the current turn
    pub fn handler_count(&self, handler: HandlerKind) -> u32 {
        self.handlers_invoked
            .iter()
            .filter(|h| **h == handler)
            .count() as u32
    }

    /// Whether `handler` ran at least once during the current turn
    pub fn has_invoked(&self, handler: HandlerKind) -> bool {
        self.handlers_invoked.contains(&handler)
    }

    /// Project the read-only view for `handler`.
    ///
    /// Returns `None` when the view's inputs do not exist yet (knowledge and
    /// account views need a classification).
    pub fn view_for(&self, handler: HandlerKind) -> Option<StateView<'_>> {
        match handler {
            HandlerKind::Classifier => Some(StateView::Classifier {
                message_log: &self.message_log,
            }),
            HandlerKind::Knowledge => Some(StateView::Knowledge {
                message_log: &self.message_log,
                classification: self.classification.as_ref()?,
            }),
            HandlerKind::AccountOps => Some(StateView::AccountOps {
                message_log: &self.message_log,
                classification: self.classification.as_ref()?,
                external_user_id: &self.external_user_id,
            }),
            HandlerKind::Escalation => Some(StateView::Escalation { state: self }),
        }
    }

    // =========================================================================
    // Mutation
    // =========================================================================

    /// Append a message, assigning its sequence number
    pub fn push_message(&mut self, mut message: Message) -> u64 {
        message.seq = self.next_seq;
        self.next_seq += 1;
        let seq = message.seq;
        self.message_log.push(message);
        self.updated_at = Utc::now();
        seq
    }

    /// Append a supervisor note
    pub fn note(&mut self, content: impl Into<String>) -> u64 {
        self.push_message(Message::system(content))
    }

    /// Start a new turn on an existing session with another user message.
    ///
    /// The per-turn dispatch record is cleared; everything else carries over.
    pub fn begin_follow_up(&mut self, message: impl Into<String>) -> CoordinationResult<u64> {
        let message = message.into();
        if message.trim().is_empty() {
            return Err(CoordinationError::invalid_input("message must not be empty"));
        }
        self.turn += 1;
        self.handlers_invoked.clear();
        Ok(self.push_message(Message::user(message)))
    }

    /// Record that `handler` ran without producing an applicable delta
    pub fn record_invocation(&mut self, handler: HandlerKind) {
        self.handlers_invoked.push(handler);
        self.updated_at = Utc::now();
    }

    /// Merge a handler's delta.
    ///
    /// The handler is recorded in `handlers_invoked` and its messages are
    /// appended in order. Classification/knowledge/account updates advance
    /// the generation; a delta produced against an older generation is
    /// rejected with [`CoordinationError::StaleDelta`] and leaves the state
    /// untouched.
    pub fn apply_delta(
        &mut self,
        handler: HandlerKind,
        delta: HandlerDelta,
    ) -> CoordinationResult<()> {
        if delta.update.handler() != handler {
            return Err(CoordinationError::handler(
                handler,
                format!(
                    "returned a {} delta it is not allowed to write",
                    delta.update.handler()
                ),
            ));
        }

        if delta.update.bumps_generation() && delta.base_generation < self.generation {
            return Err(CoordinationError::StaleDelta {
                handler,
                delta_generation: delta.base_generation,
                current_generation: self.generation,
            });
        }

        // Escalation closes the ticket, so a second one fails the transition.
        if let StateDelta::Escalation(fields) = &delta.update {
            self.close_escalated(fields)?;
        }

        self.handlers_invoked.push(handler);
        for text in delta.messages {
            self.push_message(Message::from_handler(handler, text));
        }

        match delta.update {
            StateDelta::Classification(classification) => {
                self.classification = Some(classification);
                self.generation += 1;
            }
            StateDelta::Knowledge(result) => {
                self.knowledge_result = Some(result);
                self.generation += 1;
            }
            StateDelta::Account {
                snapshot,
                operation,
            } => {
                self.account_snapshot = Some(snapshot);
                self.last_operation = Some(operation);
                self.generation += 1;
            }
            StateDelta::Escalation(_) => {}
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Policy: mark the ticket as requiring escalation
    pub fn require_escalation(&mut self, reason: EscalationReason) {
        self.decision.requires_escalation = true;
        self.decision.escalation_reason = Some(reason);
        self.decision.can_auto_resolve = false;
        self.updated_at = Utc::now();
    }

    /// Policy: allow automatic resolution
    pub fn allow_auto_resolve(&mut self) {
        if !self.decision.requires_escalation {
            self.decision.can_auto_resolve = true;
            self.updated_at = Utc::now();
        }
    }

    /// Close the ticket as resolved.
    ///
    /// Refused for blocked accounts, for tickets already marked for
    /// escalation, and for tickets that are no longer pending.
    pub fn resolve(
        &mut self,
        final_response: impl Into<String>,
        summary: impl Into<String>,
    ) -> CoordinationResult<()> {
        if self.is_blocked() || self.decision.requires_escalation || !self.decision.can_auto_resolve
        {
            return Err(CoordinationError::InvalidTransition {
                from: self.resolution.status,
                to: ResolutionStatus::Resolved,
            });
        }
        self.transition(ResolutionStatus::Resolved)?;
        self.resolution.final_response = Some(final_response.into());
        self.resolution.summary = Some(summary.into());
        Ok(())
    }

    /// Close the ticket as escalated from record fields.
    ///
    /// Used by `apply_delta` for the escalation handler and directly by the
    /// supervisor when the escalation handler itself cannot run.
    pub fn close_escalated(&mut self, fields: &EscalationFields) -> CoordinationResult<()> {
        if !self.decision.requires_escalation {
            return Err(CoordinationError::InvalidTransition {
                from: self.resolution.status,
                to: ResolutionStatus::Escalated,
            });
        }
        self.transition(ResolutionStatus::Escalated)?;
        self.resolution.summary = Some(fields.summary.clone());
        self.resolution.final_response = Some(fields.confirmation.clone());
        self.resolution.escalation_id = Some(fields.escalation_id.clone());
        Ok(())
    }

    /// Close the ticket as failed
    pub fn fail(
        &mut self,
        reason: FailureReason,
        final_response: impl Into<String>,
    ) -> CoordinationResult<()> {
        self.transition(ResolutionStatus::Failed)?;
        self.resolution.failure_reason = Some(reason);
        self.resolution.final_response = Some(final_response.into());
        self.resolution.summary = Some(format!("turn {} failed: {}", self.turn, reason));
        Ok(())
    }

    fn transition(&mut self, to: ResolutionStatus) -> CoordinationResult<()> {
        if self.resolution.status != ResolutionStatus::Pending || !to.is_terminal() {
            return Err(CoordinationError::InvalidTransition {
                from: self.resolution.status,
                to,
            });
        }
        self.resolution.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Get a summary for logging
    pub fn summary(&self) -> String {
        let handlers: Vec<&str> = self.handlers_invoked.iter().map(|h| h.as_str()).collect();
        format!(
            "session={} ticket={} turn={} status={} gen={} handlers=[{}]",
            self.session_id,
            self.ticket_id,
            self.turn,
            self.resolution.status,
            self.generation,
            handlers.join(","),
        )
    }
}
