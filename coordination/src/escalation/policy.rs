//! Routing Policy: deterministic next-step selection for a ticket turn
//!
//! Consumes the ticket state, the per-turn [`TurnLedger`] and the user's
//! [`HistoryInsight`] to produce a [`RouteDecision`]. All decisions are
//! pure: no I/O, no handler calls, same inputs give the same output.
//!
//! # Routing table (first match wins)
//!
//! ```text
//! account blocked                              → escalate blocked_account
//! handler failures > max_handler_failures      → escalate handler_failure
//! no classification                            → dispatch classifier
//! category refund | billing-dispute            → escalate refund_or_dispute
//! urgency critical (when enabled)              → escalate critical_urgency
//! classifier recommends escalation             → escalate handler_recommendation
//! recommends knowledge, no knowledge result    → dispatch knowledge
//! knowledge confidence ≥ threshold, has answer → resolve (knowledge)
//! knowledge result otherwise                   → escalate low_confidence
//! recommends account_ops, no snapshot          → dispatch account_ops
//! snapshot ok, operation succeeded             → resolve (account)
//! every non-escalation handler already ran     → escalate no_resolution_path
//! otherwise                                    → dispatch hinted or first unused handler
//! ```
//!
//! Any dispatch of a handler that already used its per-turn allowance, or
//! past the turn's total dispatch allowance, becomes an escalation with
//! reason `routing_budget_exceeded`.

use serde::{Deserialize, Serialize};

use super::heuristics::HistoryInsight;
use crate::state::{EscalationReason, HandlerKind, TicketState, Urgency};

/// Tunable policy constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum knowledge confidence for automatic resolution
    pub confidence_threshold: f64,
    /// Per-handler dispatch allowance within one turn
    pub max_handler_calls_per_turn: u32,
    /// Handler failures tolerated before forcing escalation
    pub max_handler_failures: u32,
    /// Escalate tickets the classifier marks critical
    pub escalate_critical_urgency: bool,
    /// Threshold increase for users with repeated recent escalations
    pub repeat_escalation_penalty: f64,
    /// How many of the newest history entries count as recent
    pub repeat_escalation_window: usize,
    /// Recent escalations needed before the penalty applies
    pub repeat_escalation_min: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            max_handler_calls_per_turn: 1,
            max_handler_failures: 2,
            escalate_critical_urgency: false,
            repeat_escalation_penalty: 0.1,
            repeat_escalation_window: 5,
            repeat_escalation_min: 2,
        }
    }
}

impl PolicyConfig {
    /// Upper bound on non-escalation dispatches in one turn
    pub fn max_routing_dispatches(&self) -> u32 {
        self.max_handler_calls_per_turn
            .saturating_mul(HandlerKind::NON_ESCALATION.len() as u32)
    }

    /// Upper bound on all dispatches in one turn (escalation included)
    pub fn max_total_dispatches(&self) -> u32 {
        self.max_handler_calls_per_turn
            .saturating_mul(HandlerKind::ALL.len() as u32)
            .saturating_add(1)
    }

    /// Clamp values into their meaningful ranges
    pub fn normalized(mut self) -> Self {
        if self.confidence_threshold.is_nan() {
            self.confidence_threshold = Self::default().confidence_threshold;
        }
        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self.max_handler_calls_per_turn = self.max_handler_calls_per_turn.max(1);
        if !self.repeat_escalation_penalty.is_finite() || self.repeat_escalation_penalty < 0.0 {
            self.repeat_escalation_penalty = 0.0;
        }
        self
    }
}

/// Which evidence justified an automatic resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Top knowledge article at or above threshold
    Knowledge,
    /// Successful account operation
    AccountOperation,
}

/// Output of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "detail")]
pub enum RouteDecision {
    /// Run this handler next
    Dispatch(HandlerKind),
    /// Close the ticket as resolved
    Resolve(ResolutionPath),
    /// Mark for escalation and run the escalation handler
    Escalate(EscalationReason),
}

impl std::fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dispatch(h) => write!(f, "dispatch({})", h),
            Self::Resolve(ResolutionPath::Knowledge) => write!(f, "resolve(knowledge)"),
            Self::Resolve(ResolutionPath::AccountOperation) => write!(f, "resolve(account)"),
            Self::Escalate(r) => write!(f, "escalate({})", r),
        }
    }
}

/// Per-turn routing counters kept by the supervisor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnLedger {
    /// Non-escalation dispatches this turn (failed runs included)
    pub dispatches: u32,
    /// Handler failures this turn
    pub failures: u32,
    /// Advisory next-handler hint from the most recent handler
    pub recommended_next: Option<HandlerKind>,
}

impl TurnLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dispatch and clear the previous hint
    pub fn record_dispatch(&mut self) {
        self.dispatches += 1;
        self.recommended_next = None;
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
    }
}

/// The deterministic routing policy
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    config: PolicyConfig,
}

impl RoutingPolicy {
    /// Create a policy with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: PolicyConfig) -> Self {
        Self {
            config: config.normalized(),
        }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Decide the next step for a pending ticket
    pub fn decide(
        &self,
        state: &TicketState,
        ledger: &TurnLedger,
        insight: &HistoryInsight,
    ) -> RouteDecision {
        let decision = self.evaluate(state, ledger, insight);
        match decision {
            RouteDecision::Dispatch(handler) if self.is_exhausted(state, ledger, handler) => {
                RouteDecision::Escalate(EscalationReason::RoutingBudgetExceeded)
            }
            other => other,
        }
    }

    /// Whether `handler` may not be dispatched again this turn
    pub fn is_exhausted(&self, state: &TicketState, ledger: &TurnLedger, handler: HandlerKind) -> bool {
        state.handler_count(handler) >= self.config.max_handler_calls_per_turn
            || ledger.dispatches >= self.config.max_routing_dispatches()
    }

    fn evaluate(
        &self,
        state: &TicketState,
        ledger: &TurnLedger,
        insight: &HistoryInsight,
    ) -> RouteDecision {
        if state.is_blocked() {
            return RouteDecision::Escalate(EscalationReason::BlockedAccount);
        }
        if ledger.failures > self.config.max_handler_failures {
            return RouteDecision::Escalate(EscalationReason::HandlerFailure);
        }

        let Some(classification) = state.classification() else {
            return RouteDecision::Dispatch(HandlerKind::Classifier);
        };

        if classification.category.is_refund_or_dispute() {
            return RouteDecision::Escalate(EscalationReason::RefundOrDispute);
        }
        if self.config.escalate_critical_urgency && classification.urgency == Urgency::Critical {
            return RouteDecision::Escalate(EscalationReason::CriticalUrgency);
        }
        let recommended = classification.recommended_handler;
        if recommended == HandlerKind::Escalation {
            return RouteDecision::Escalate(EscalationReason::HandlerRecommendation);
        }

        if recommended == HandlerKind::Knowledge && state.knowledge_result().is_none() {
            return RouteDecision::Dispatch(HandlerKind::Knowledge);
        }
        if let Some(result) = state.knowledge_result() {
            let threshold = insight.effective_threshold(&self.config);
            if result.confidence >= threshold && result.top().is_some() {
                return RouteDecision::Resolve(ResolutionPath::Knowledge);
            }
            return RouteDecision::Escalate(EscalationReason::LowConfidence);
        }

        if recommended == HandlerKind::AccountOps && state.account_snapshot().is_none() {
            return RouteDecision::Dispatch(HandlerKind::AccountOps);
        }
        if state.account_snapshot().is_some()
            && state.last_operation().map(|op| op.succeeded).unwrap_or(false)
        {
            return RouteDecision::Resolve(ResolutionPath::AccountOperation);
        }

        if HandlerKind::NON_ESCALATION
            .iter()
            .all(|h| state.has_invoked(*h))
        {
            return RouteDecision::Escalate(EscalationReason::NoResolutionPath);
        }

        // No rule matched: the handler hint breaks the tie
        if let Some(hint) = ledger.recommended_next {
            if hint != HandlerKind::Escalation
                && !state.has_invoked(hint)
                && !self.is_exhausted(state, ledger, hint)
            {
                return RouteDecision::Dispatch(hint);
            }
        }
        HandlerKind::NON_ESCALATION
            .iter()
            .copied()
            .find(|h| !state.has_invoked(*h))
            .map(RouteDecision::Dispatch)
            .unwrap_or(RouteDecision::Escalate(EscalationReason::NoResolutionPath))
    }
}
