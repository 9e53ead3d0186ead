//! Handler contract and the reference handlers.
//!
//! A handler reads a [`StateView`] projected for its variant, consults the
//! services injected through its [`HandlerContext`], and returns a
//! [`HandlerResult`] holding exactly one tagged [`StateDelta`]. Handlers keep
//! no state between calls.

pub mod account;
pub mod classifier;
pub mod escalation;
pub mod knowledge;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use coordination::state::{HandlerKind, StateDelta, StateView};
use thiserror::Error;

pub use account::{AccountDirectory, AccountOpsHandler, InMemoryAccountDirectory};
pub use classifier::ClassifierHandler;
pub use escalation::EscalationHandler;
pub use knowledge::{InMemoryKnowledgeBase, KnowledgeArticle, KnowledgeBase, KnowledgeHandler};

// ──────────────────────────────────────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────────────────────────────────────

/// Coarse classification of handler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// Backing service unreachable or timed out.
    Unavailable,
    /// The handler produced output that does not fit its contract.
    MalformedOutput,
    /// A business-rule failure (e.g. reservation not found).
    Domain,
}

impl fmt::Display for HandlerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable => write!(f, "unavailable"),
            Self::MalformedOutput => write!(f, "malformed_output"),
            Self::Domain => write!(f, "domain"),
        }
    }
}

/// Failure raised by a handler or one of its services.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed handler output: {0}")]
    MalformedOutput(String),

    #[error("{0}")]
    Domain(String),
}

impl HandlerError {
    pub fn kind(&self) -> HandlerErrorKind {
        match self {
            Self::Unavailable(_) => HandlerErrorKind::Unavailable,
            Self::MalformedOutput(_) => HandlerErrorKind::MalformedOutput,
            Self::Domain(_) => HandlerErrorKind::Domain,
        }
    }

    pub fn domain(message: impl Into<String>) -> Self {
        Self::Domain(message.into())
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Contract
// ──────────────────────────────────────────────────────────────────────────────

/// External collaborators handlers may consult.
#[derive(Clone)]
pub struct HandlerServices {
    pub knowledge: Arc<dyn KnowledgeBase>,
    pub accounts: Arc<dyn AccountDirectory>,
}

impl HandlerServices {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            knowledge,
            accounts,
        }
    }

    /// Sample knowledge base and account directory
    pub fn reference() -> Self {
        Self::new(
            Arc::new(InMemoryKnowledgeBase::with_sample_articles()),
            Arc::new(InMemoryAccountDirectory::with_sample_accounts()),
        )
    }
}

/// Per-call capability object handed to a handler.
#[derive(Clone, Copy)]
pub struct HandlerContext<'a> {
    pub session_id: &'a str,
    pub ticket_id: &'a str,
    /// 1-indexed turn number
    pub turn: u32,
    pub services: &'a HandlerServices,
}

/// A handler's advisory hint about what should happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStep {
    Handler(HandlerKind),
    Terminate,
}

/// Output of one handler run.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResult {
    pub delta: StateDelta,
    /// Outbound text, in emission order
    pub messages: Vec<String>,
    pub recommended_next: Option<NextStep>,
}

impl HandlerResult {
    pub fn new(delta: StateDelta) -> Self {
        Self {
            delta,
            messages: Vec::new(),
            recommended_next: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn recommend(mut self, next: NextStep) -> Self {
        self.recommended_next = Some(next);
        self
    }
}

/// A unit of work over one ticket view.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Which variant this handler implements
    fn kind(&self) -> HandlerKind;

    /// Run against the view projected for [`Handler::kind`]
    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError>;
}

/// Check a view was projected for the handler receiving it
pub(crate) fn expect_view(
    handler: HandlerKind,
    view: &StateView<'_>,
) -> Result<(), HandlerError> {
    if view.handler() != handler {
        return Err(HandlerError::MalformedOutput(format!(
            "{} handler received a {} view",
            handler,
            view.handler()
        )));
    }
    Ok(())
}

/// The four handlers the supervisor dispatches to.
#[derive(Clone)]
pub struct HandlerSet {
    classifier: Arc<dyn Handler>,
    knowledge: Arc<dyn Handler>,
    account_ops: Arc<dyn Handler>,
    escalation: Arc<dyn Handler>,
}

impl HandlerSet {
    pub fn new(
        classifier: Arc<dyn Handler>,
        knowledge: Arc<dyn Handler>,
        account_ops: Arc<dyn Handler>,
        escalation: Arc<dyn Handler>,
    ) -> Self {
        Self {
            classifier,
            knowledge,
            account_ops,
            escalation,
        }
    }

    /// The rule-based reference handlers
    pub fn reference() -> Self {
        Self::new(
            Arc::new(ClassifierHandler::new()),
            Arc::new(KnowledgeHandler::new()),
            Arc::new(AccountOpsHandler::new()),
            Arc::new(EscalationHandler::new()),
        )
    }

    /// Replace the handler registered for `handler.kind()`
    pub fn with_handler(mut self, handler: Arc<dyn Handler>) -> Self {
        match handler.kind() {
            HandlerKind::Classifier => self.classifier = handler,
            HandlerKind::Knowledge => self.knowledge = handler,
            HandlerKind::AccountOps => self.account_ops = handler,
            HandlerKind::Escalation => self.escalation = handler,
        }
        self
    }

    pub fn get(&self, kind: HandlerKind) -> &dyn Handler {
        match kind {
            HandlerKind::Classifier => self.classifier.as_ref(),
            HandlerKind::Knowledge => self.knowledge.as_ref(),
            HandlerKind::AccountOps => self.account_ops.as_ref(),
            HandlerKind::Escalation => self.escalation.as_ref(),
        }
    }
}

impl Default for HandlerSet {
    fn default() -> Self {
        Self::reference()
    }
}
