//! Rule-based ticket classifier.
//!
//! Matches the submitter's text against ordered phrase rules. The first rule
//! that fires decides category, urgency and recommended handler; every
//! matched phrase across all rules becomes a keyword.

use std::sync::LazyLock;

use async_trait::async_trait;
use coordination::state::{Category, Classification, HandlerKind, StateDelta, StateView, Urgency};
use regex::Regex;
use tracing::debug;

use super::{expect_view, Handler, HandlerContext, HandlerError, HandlerResult, NextStep};

struct Rule {
    pattern: &'static LazyLock<Regex>,
    category: Category,
    urgency: Urgency,
    recommended: HandlerKind,
}

static DISPUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(charged twice|double charged?|chargeback|dispute|unauthori[sz]ed charge)\b")
        .expect("DISPUTE_RE regex should compile")
});

static REFUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(refunds?|money back|reimburse(?:ment)?)\b")
        .expect("REFUND_RE regex should compile")
});

static BLOCKED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(blocked|suspended|locked out|banned)\b")
        .expect("BLOCKED_RE regex should compile")
});

static HOW_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(how (?:do|can|to)|what is|where (?:do|can|is))\b")
        .expect("HOW_TO_RE regex should compile")
});

static RESERVATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(reservations?|bookings?|booked|my events?)\b")
        .expect("RESERVATION_RE regex should compile")
});

static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(my account|subscriptions?|quota|my plan|pause|membership)\b")
        .expect("ACCOUNT_RE regex should compile")
});

static TECHNICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(log ?in|sign ?in|password|reset|app|crash(?:es|ed)?|qr code|error)\b")
        .expect("TECHNICAL_RE regex should compile")
});

static URGENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(urgent|asap|immediately|right now)\b")
        .expect("URGENT_RE regex should compile")
});

/// Ordered rule table; the first match wins
static RULES: [Rule; 7] = [
    Rule {
        pattern: &DISPUTE_RE,
        category: Category::BillingDispute,
        urgency: Urgency::Critical,
        recommended: HandlerKind::Escalation,
    },
    Rule {
        pattern: &REFUND_RE,
        category: Category::Refund,
        urgency: Urgency::Critical,
        recommended: HandlerKind::Escalation,
    },
    Rule {
        pattern: &BLOCKED_RE,
        category: Category::Account,
        urgency: Urgency::Critical,
        recommended: HandlerKind::Escalation,
    },
    Rule {
        pattern: &HOW_TO_RE,
        category: Category::Technical,
        urgency: Urgency::Low,
        recommended: HandlerKind::Knowledge,
    },
    Rule {
        pattern: &RESERVATION_RE,
        category: Category::Reservation,
        urgency: Urgency::Medium,
        recommended: HandlerKind::AccountOps,
    },
    Rule {
        pattern: &ACCOUNT_RE,
        category: Category::Account,
        urgency: Urgency::Medium,
        recommended: HandlerKind::AccountOps,
    },
    Rule {
        pattern: &TECHNICAL_RE,
        category: Category::Technical,
        urgency: Urgency::Medium,
        recommended: HandlerKind::Knowledge,
    },
];

/// Classify free text without a state view
pub fn classify_text(text: &str) -> Classification {
    let keywords: Vec<String> = RULES
        .iter()
        .flat_map(|rule| rule.pattern.find_iter(text))
        .map(|m| m.as_str().to_lowercase())
        .collect();

    let (category, mut urgency, recommended) = RULES
        .iter()
        .find(|rule| rule.pattern.is_match(text))
        .map(|rule| (rule.category, rule.urgency, rule.recommended))
        .unwrap_or((Category::General, Urgency::Low, HandlerKind::Knowledge));

    if URGENT_RE.is_match(text) && urgency < Urgency::High {
        urgency = Urgency::High;
    }

    Classification::new(category, urgency, keywords, recommended)
}

/// Reference classifier over the full user text of the session
#[derive(Debug, Default, Clone, Copy)]
pub struct ClassifierHandler;

impl ClassifierHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for ClassifierHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Classifier
    }

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        expect_view(HandlerKind::Classifier, &view)?;
        let text = view.user_text();
        if text.trim().is_empty() {
            return Err(HandlerError::MalformedOutput(
                "no user text to classify".into(),
            ));
        }

        let classification = classify_text(&text);
        debug!(
            session_id = ctx.session_id,
            category = %classification.category,
            urgency = %classification.urgency,
            recommended = %classification.recommended_handler,
            "Ticket classified"
        );

        let message = format!(
            "Classified as {} ({} urgency)",
            classification.category, classification.urgency
        );
        let next = NextStep::Handler(classification.recommended_handler);
        Ok(HandlerResult::new(StateDelta::Classification(classification))
            .with_message(message)
            .recommend(next))
    }
}
