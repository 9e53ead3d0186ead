//! Turn State Machine: explicit phases and legal transition guards for one
//! supervisor turn.
//!
//! The supervisor calls `advance()` between phases. Each call validates the
//! edge and records it, so a finished turn carries an auditable trace of how
//! it reached its terminal phase.

use std::fmt;
use std::time::Instant;

use coordination::state::ResolutionStatus;
use serde::{Deserialize, Serialize};

/// Phases of a single turn.
///
/// Every turn starts at `Loading` and ends at `Resolved`, `Escalated` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    /// Loading or creating the session state.
    Loading,
    /// Consulting the routing policy.
    Routing,
    /// Running a non-escalation handler.
    Dispatching,
    /// Running the escalation handler.
    Escalating,
    /// Terminal: resolved automatically.
    Resolved,
    /// Terminal: handed to a human.
    Escalated,
    /// Terminal: infrastructure failure.
    Failed,
}

impl TurnPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Escalated | Self::Failed)
    }

    /// Terminal phase matching a ticket status
    pub fn for_status(status: ResolutionStatus) -> Option<Self> {
        match status {
            ResolutionStatus::Pending => None,
            ResolutionStatus::Resolved => Some(Self::Resolved),
            ResolutionStatus::Escalated => Some(Self::Escalated),
            ResolutionStatus::Failed => Some(Self::Failed),
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "Loading"),
            Self::Routing => write!(f, "Routing"),
            Self::Dispatching => write!(f, "Dispatching"),
            Self::Escalating => write!(f, "Escalating"),
            Self::Resolved => write!(f, "Resolved"),
            Self::Escalated => write!(f, "Escalated"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Legal edges of the turn graph:
/// ```text
/// Loading     → Routing | Failed
/// Routing     → Dispatching | Escalating | Resolved | Failed
/// Dispatching → Routing | Failed
/// Escalating  → Escalated | Failed
/// ```
fn is_legal_transition(from: TurnPhase, to: TurnPhase) -> bool {
    use TurnPhase::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Loading, Routing)
            | (Routing, Dispatching)
            | (Routing, Escalating)
            | (Routing, Resolved)
            | (Dispatching, Routing)
            | (Escalating, Escalated)
    )
}

/// A single recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TurnPhase,
    pub to: TurnPhase,
    /// Handler dispatches completed when the transition happened.
    pub dispatch: u32,
    /// Milliseconds since the turn started.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone)]
pub struct IllegalTransition {
    pub from: TurnPhase,
    pub to: TurnPhase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal turn transition: {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Phase tracker for one turn.
pub struct TurnStateMachine {
    current: TurnPhase,
    dispatch: u32,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl TurnStateMachine {
    pub fn new() -> Self {
        Self {
            current: TurnPhase::Loading,
            dispatch: 0,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> TurnPhase {
        self.current
    }

    pub fn dispatch(&self) -> u32 {
        self.dispatch
    }

    pub fn set_dispatch(&mut self, dispatch: u32) {
        self.dispatch = dispatch;
    }

    /// Move to `to` if the edge is legal.
    pub fn advance(&mut self, to: TurnPhase, reason: Option<&str>) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            dispatch = self.dispatch,
            "Turn transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            dispatch: self.dispatch,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Move to `Failed`; legal from any non-terminal phase.
    pub fn fail(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(TurnPhase::Failed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn summary(&self) -> String {
        let phases: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut out = format!(
            "{} -> {} ({}ms, {} transitions)",
            TurnPhase::Loading,
            self.current,
            self.created_at.elapsed().as_millis(),
            self.transitions.len(),
        );
        if !phases.is_empty() {
            out.push_str(&format!(" [{}]", phases.join(" -> ")));
        }
        out
    }
}

impl Default for TurnStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
