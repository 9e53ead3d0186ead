//! Escalation handler: turns a ticket marked for escalation into the record
//! a human reviewer picks up, plus the confirmation the submitter sees.

use async_trait::async_trait;
use chrono::Utc;
use coordination::state::{
    EscalationFields, EscalationReason, HandlerKind, Role, StateDelta, StateView, TicketState,
};
use tracing::info;
use uuid::Uuid;

use super::{expect_view, Handler, HandlerContext, HandlerError, HandlerResult, NextStep};

/// Longest user excerpt copied into a reviewer summary
const EXCERPT_CHARS: usize = 160;

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

/// Reviewer summary for an escalated ticket
pub fn escalation_summary(state: &TicketState, reason: EscalationReason) -> String {
    let mut lines = vec![format!(
        "Ticket {} (session {}, user {}) escalated: {}",
        state.ticket_id(),
        state.session_id(),
        state.external_user_id(),
        reason
    )];
    if let Some(c) = state.classification() {
        lines.push(format!("Classified {} with {} urgency", c.category, c.urgency));
    }
    if let Some(k) = state.knowledge_result() {
        lines.push(format!(
            "Knowledge confidence {:.2} over {} article(s)",
            k.confidence,
            k.matched_articles.len()
        ));
    }
    if let Some(op) = state.last_operation() {
        lines.push(format!(
            "Account operation '{}' {}: {}",
            op.operation,
            if op.succeeded { "succeeded" } else { "not completed" },
            op.detail
        ));
    }
    if let Some(latest) = state
        .message_log()
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
    {
        lines.push(format!("Latest request: \"{}\"", excerpt(&latest.content)));
    }
    lines.join("\n")
}

/// Build escalation record fields with a fresh reference id
pub fn escalation_fields(state: &TicketState, reason: EscalationReason) -> EscalationFields {
    let escalation_id = format!("ESC-{}", Uuid::new_v4().simple());
    let confirmation = format!(
        "Your request has been passed to our support team because {}. Your reference is {}.",
        reason.describe(),
        escalation_id
    );
    EscalationFields {
        summary: escalation_summary(state, reason),
        escalation_id,
        reason,
        confirmation,
        created_at: Utc::now(),
    }
}

/// Produces the escalation record for tickets the policy marked
#[derive(Debug, Default, Clone, Copy)]
pub struct EscalationHandler;

impl EscalationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for EscalationHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Escalation
    }

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        expect_view(HandlerKind::Escalation, &view)?;
        let StateView::Escalation { state } = view else {
            return Err(HandlerError::MalformedOutput(
                "escalation handler requires the full state".into(),
            ));
        };
        let reason = state.decision().escalation_reason.ok_or_else(|| {
            HandlerError::MalformedOutput("ticket has no escalation reason".into())
        })?;

        let fields = escalation_fields(state, reason);
        info!(
            session_id = ctx.session_id,
            ticket_id = ctx.ticket_id,
            escalation_id = %fields.escalation_id,
            reason = %reason,
            "Escalation record prepared"
        );

        let confirmation = fields.confirmation.clone();
        Ok(HandlerResult::new(StateDelta::Escalation(fields))
            .with_message(confirmation)
            .recommend(NextStep::Terminate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerServices;

    #[tokio::test]
    async fn test_escalation_fields_from_decision() {
        let mut state =
            TicketState::create("s-1", "t-1", "user-001", "email", "I want a refund").unwrap();
        state.require_escalation(EscalationReason::RefundOrDispute);

        let services = HandlerServices::reference();
        let ctx = HandlerContext {
            session_id: "s-1",
            ticket_id: "t-1",
            turn: 1,
            services: &services,
        };
        let view = state.view_for(HandlerKind::Escalation).unwrap();
        let result = EscalationHandler::new().run(&ctx, view).await.unwrap();

        let StateDelta::Escalation(fields) = &result.delta else {
            panic!("expected escalation delta");
        };
        assert!(fields.escalation_id.starts_with("ESC-"));
        assert_eq!(fields.reason, EscalationReason::RefundOrDispute);
        assert!(fields.confirmation.contains(&fields.escalation_id));
        assert!(fields.summary.contains("refund_or_dispute"));
        assert!(fields.summary.contains("I want a refund"));
        assert_eq!(result.messages, vec![fields.confirmation.clone()]);
    }

    #[tokio::test]
    async fn test_requires_escalation_reason() {
        let state = TicketState::create("s", "t", "u", "chat", "hello").unwrap();
        let services = HandlerServices::reference();
        let ctx = HandlerContext {
            session_id: "s",
            ticket_id: "t",
            turn: 1,
            services: &services,
        };
        let view = state.view_for(HandlerKind::Escalation).unwrap();
        let err = EscalationHandler::new().run(&ctx, view).await.unwrap_err();
        assert!(err.to_string().contains("no escalation reason"));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(400);
        let e = excerpt(&long);
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
