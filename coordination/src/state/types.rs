//! Ticket state record types
//!
//! Plain data carried by [`TicketState`](super::ticket::TicketState). All
//! enums serialize in snake_case except [`Category`], which keeps the
//! kebab-case labels used by the classifier (`billing-dispute`).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four handler variants the supervisor can dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Category / urgency / keyword extraction
    Classifier,
    /// Knowledge base retrieval
    Knowledge,
    /// User, subscription and reservation operations
    AccountOps,
    /// Hand-off to a human reviewer
    Escalation,
}

impl HandlerKind {
    /// Every handler, in dispatch-preference order
    pub const ALL: [HandlerKind; 4] = [
        Self::Classifier,
        Self::Knowledge,
        Self::AccountOps,
        Self::Escalation,
    ];

    /// Handlers that may run before the terminal escalation step
    pub const NON_ESCALATION: [HandlerKind; 3] =
        [Self::Classifier, Self::Knowledge, Self::AccountOps];

    /// Stable name used in logs, events and `handlers_invoked`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Knowledge => "knowledge",
            Self::AccountOps => "account_ops",
            Self::Escalation => "escalation",
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The ticket submitter
    User,
    /// Output from one of the handlers
    Handler,
    /// Supervisor notes (failures, history context, compaction summaries)
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Handler => write!(f, "handler"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A single role-tagged entry in the message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonic sequence number (assigned by the state)
    pub seq: u64,
    /// Message role
    pub role: Role,
    /// Handler that produced this message, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<HandlerKind>,
    /// Message text
    pub content: String,
    /// When the message was appended
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create an unsequenced message (seq assigned on append)
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            seq: 0,
            role,
            handler: None,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// A user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// A system note
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// A handler message
    pub fn from_handler(handler: HandlerKind, content: impl Into<String>) -> Self {
        Self {
            handler: Some(handler),
            ..Self::new(Role::Handler, content)
        }
    }
}

/// Ticket category assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Technical,
    Billing,
    BillingDispute,
    Refund,
    Account,
    Reservation,
    General,
}

impl Category {
    /// Categories that always go to a human regardless of other signals
    pub fn is_refund_or_dispute(&self) -> bool {
        matches!(self, Self::Refund | Self::BillingDispute)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Technical => write!(f, "technical"),
            Self::Billing => write!(f, "billing"),
            Self::BillingDispute => write!(f, "billing-dispute"),
            Self::Refund => write!(f, "refund"),
            Self::Account => write!(f, "account"),
            Self::Reservation => write!(f, "reservation"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Ticket urgency assigned by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub urgency: Urgency,
    /// Extracted keywords (set semantics)
    pub keywords: BTreeSet<String>,
    /// Which handler the classifier thinks should run next
    pub recommended_handler: HandlerKind,
}

impl Classification {
    /// Build a classification from any keyword iterator
    pub fn new<I, S>(
        category: Category,
        urgency: Urgency,
        keywords: I,
        recommended_handler: HandlerKind,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category,
            urgency,
            keywords: keywords.into_iter().map(Into::into).collect(),
            recommended_handler,
        }
    }

    /// Whether any keyword matches (case-insensitive)
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(keyword))
    }
}

/// A knowledge article matched by the knowledge handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// Opaque article identifier
    pub article_id: String,
    pub title: String,
    pub content: String,
    /// Relevance score (only the ordering is meaningful to the core)
    pub score: f64,
}

/// Knowledge handler output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeResult {
    /// Matched articles, descending by score
    pub matched_articles: Vec<Article>,
    /// Answer adequacy estimate in [0, 1]
    pub confidence: f64,
}

impl KnowledgeResult {
    /// Build a result, sorting articles by descending score and clamping confidence
    pub fn new(mut matched_articles: Vec<Article>, confidence: f64) -> Self {
        matched_articles.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            matched_articles,
            confidence,
        }
    }

    /// Highest-ranked article
    pub fn top(&self) -> Option<&Article> {
        self.matched_articles.first()
    }
}

/// User record from the account directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
}

/// Subscription lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Paused,
    Cancelled,
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Paused => write!(f, "paused"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Subscription record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub tier: String,
    pub monthly_quota: u32,
}

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Reserved,
    Cancelled,
    Completed,
}

/// Reservation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub reservation_id: String,
    pub experience: String,
    pub status: ReservationStatus,
    pub starts_at: DateTime<Utc>,
}

/// Account data gathered by the account handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub user: UserRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionRecord>,
    #[serde(default)]
    pub reservations: Vec<ReservationRecord>,
    /// Hard escalation trigger
    pub is_blocked: bool,
}

impl AccountSnapshot {
    /// Reservations still in the `reserved` state
    pub fn active_reservations(&self) -> impl Iterator<Item = &ReservationRecord> {
        self.reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Reserved)
    }
}

/// Account operation performed by the account handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum AccountOperation {
    Lookup,
    SubscriptionStatus,
    CancelReservation { reservation_id: String },
    PauseSubscription,
    CancelSubscription,
}

impl std::fmt::Display for AccountOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lookup => write!(f, "account lookup"),
            Self::SubscriptionStatus => write!(f, "subscription status"),
            Self::CancelReservation { reservation_id } => {
                write!(f, "cancel reservation {}", reservation_id)
            }
            Self::PauseSubscription => write!(f, "pause subscription"),
            Self::CancelSubscription => write!(f, "cancel subscription"),
        }
    }
}

/// Outcome of the account operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation: AccountOperation,
    pub succeeded: bool,
    /// Human-readable confirmation or reason
    pub detail: String,
}

/// Why a ticket was handed to a human
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    BlockedAccount,
    RefundOrDispute,
    CriticalUrgency,
    HandlerRecommendation,
    LowConfidence,
    NoResolutionPath,
    HandlerFailure,
    RoutingBudgetExceeded,
}

impl EscalationReason {
    /// Short explanation for summaries and confirmations
    pub fn describe(&self) -> &'static str {
        match self {
            Self::BlockedAccount => "the account is blocked and needs manual review",
            Self::RefundOrDispute => "refunds and billing disputes are handled by the billing team",
            Self::CriticalUrgency => "the request was flagged as critical",
            Self::HandlerRecommendation => "the request needs a human specialist",
            Self::LowConfidence => "no sufficiently reliable answer was found",
            Self::NoResolutionPath => "no automated resolution path applies",
            Self::HandlerFailure => "automated handling failed repeatedly",
            Self::RoutingBudgetExceeded => "automated handling did not converge",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockedAccount => write!(f, "blocked_account"),
            Self::RefundOrDispute => write!(f, "refund_or_dispute"),
            Self::CriticalUrgency => write!(f, "critical_urgency"),
            Self::HandlerRecommendation => write!(f, "handler_recommendation"),
            Self::LowConfidence => write!(f, "low_confidence"),
            Self::NoResolutionPath => write!(f, "no_resolution_path"),
            Self::HandlerFailure => write!(f, "handler_failure"),
            Self::RoutingBudgetExceeded => write!(f, "routing_budget_exceeded"),
        }
    }
}

/// Why a turn ended in `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    StoreUnavailable,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::StoreUnavailable => write!(f, "store_unavailable"),
        }
    }
}

/// Policy decision fields (written only by the supervisor)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub requires_escalation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    pub can_auto_resolve: bool,
}

/// Resolution lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Pending,
    Resolved,
    Escalated,
    Failed,
}

impl ResolutionStatus {
    /// Whether this status ends a turn
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Resolved => write!(f, "resolved"),
            Self::Escalated => write!(f, "escalated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal projection of the ticket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub status: ResolutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Reference handed to the submitter on escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            status: ResolutionStatus::Pending,
            final_response: None,
            summary: None,
            escalation_id: None,
            failure_reason: None,
        }
    }
}
