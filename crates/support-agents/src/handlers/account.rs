//! Account operations handler and the in-memory account directory.
//!
//! The handler picks one operation from the classification keywords and
//! the latest user message, performs it against the [`AccountDirectory`],
//! and returns a fresh snapshot alongside the operation result. Blocked
//! accounts are reported but never mutated.

use std::collections::HashMap;
use std::sync::{LazyLock, RwLock};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use coordination::state::{
    AccountOperation, AccountSnapshot, Classification, HandlerKind, OperationResult,
    ReservationRecord, ReservationStatus, StateDelta, StateView, SubscriptionRecord,
    SubscriptionStatus, UserRecord,
};
use regex::Regex;
use tracing::{debug, info};

use super::{expect_view, Handler, HandlerContext, HandlerError, HandlerResult, NextStep};

static RESERVATION_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bres-\d+\b").expect("RESERVATION_ID_RE regex should compile")
});

/// Abstraction over user, subscription and reservation records.
///
/// Lookups return `Ok(None)` for unknown users; mutations report business
/// rule violations as [`HandlerError::Domain`].
#[cfg_attr(test, mockall::automock)]
pub trait AccountDirectory: Send + Sync {
    /// Full account data for a user
    fn snapshot(&self, user_id: &str) -> Result<Option<AccountSnapshot>, HandlerError>;

    fn cancel_reservation(
        &self,
        user_id: &str,
        reservation_id: &str,
    ) -> Result<ReservationRecord, HandlerError>;

    fn pause_subscription(&self, user_id: &str) -> Result<SubscriptionRecord, HandlerError>;

    fn cancel_subscription(&self, user_id: &str) -> Result<SubscriptionRecord, HandlerError>;
}

/// Account directory held in process memory
#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashMap<String, AccountSnapshot>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an account
    pub fn with_account(self, snapshot: AccountSnapshot) -> Self {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(snapshot.user.user_id.clone(), snapshot);
        }
        self
    }

    /// Three accounts: active premium with bookings, blocked, paused
    pub fn with_sample_accounts() -> Self {
        let now = Utc::now();
        let reservation = |id: &str, experience: &str, status, days: i64| ReservationRecord {
            reservation_id: id.to_string(),
            experience: experience.to_string(),
            status,
            starts_at: now + Duration::days(days),
        };
        let user = |id: &str, name: &str, email: &str| UserRecord {
            user_id: id.to_string(),
            full_name: name.to_string(),
            email: email.to_string(),
        };

        Self::new()
            .with_account(AccountSnapshot {
                user: user("user-001", "Alice Moreau", "alice@example.com"),
                subscription: Some(SubscriptionRecord {
                    subscription_id: "sub-001".into(),
                    status: SubscriptionStatus::Active,
                    tier: "premium".into(),
                    monthly_quota: 8,
                }),
                reservations: vec![
                    reservation("res-1001", "Sunset kayak tour", ReservationStatus::Reserved, 3),
                    reservation("res-1002", "Pottery workshop", ReservationStatus::Reserved, 10),
                    reservation("res-0990", "Wine tasting", ReservationStatus::Completed, -14),
                ],
                is_blocked: false,
            })
            .with_account(AccountSnapshot {
                user: user("user-002", "Bruno Keller", "bruno@example.com"),
                subscription: Some(SubscriptionRecord {
                    subscription_id: "sub-002".into(),
                    status: SubscriptionStatus::Active,
                    tier: "basic".into(),
                    monthly_quota: 4,
                }),
                reservations: vec![reservation(
                    "res-2001",
                    "City food walk",
                    ReservationStatus::Reserved,
                    5,
                )],
                is_blocked: true,
            })
            .with_account(AccountSnapshot {
                user: user("user-003", "Chen Li", "chen@example.com"),
                subscription: Some(SubscriptionRecord {
                    subscription_id: "sub-003".into(),
                    status: SubscriptionStatus::Paused,
                    tier: "basic".into(),
                    monthly_quota: 4,
                }),
                reservations: Vec::new(),
                is_blocked: false,
            })
    }

    fn update<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut AccountSnapshot) -> Result<T, HandlerError>,
    ) -> Result<T, HandlerError> {
        let mut accounts = self
            .accounts
            .write()
            .map_err(|_| HandlerError::Unavailable("account directory lock poisoned".into()))?;
        let account = accounts
            .get_mut(user_id)
            .ok_or_else(|| HandlerError::domain(format!("user {} not found", user_id)))?;
        f(account)
    }

    fn set_subscription_status(
        &self,
        user_id: &str,
        from: SubscriptionStatus,
        to: SubscriptionStatus,
    ) -> Result<SubscriptionRecord, HandlerError> {
        self.update(user_id, |account| {
            let subscription = account
                .subscription
                .as_mut()
                .ok_or_else(|| HandlerError::domain("no subscription on this account"))?;
            if subscription.status != from {
                return Err(HandlerError::domain(format!(
                    "subscription is {}, expected {}",
                    subscription.status, from
                )));
            }
            subscription.status = to;
            Ok(subscription.clone())
        })
    }
}

impl AccountDirectory for InMemoryAccountDirectory {
    fn snapshot(&self, user_id: &str) -> Result<Option<AccountSnapshot>, HandlerError> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| HandlerError::Unavailable("account directory lock poisoned".into()))?;
        Ok(accounts.get(user_id).cloned())
    }

    fn cancel_reservation(
        &self,
        user_id: &str,
        reservation_id: &str,
    ) -> Result<ReservationRecord, HandlerError> {
        self.update(user_id, |account| {
            let reservation = account
                .reservations
                .iter_mut()
                .find(|r| r.reservation_id.eq_ignore_ascii_case(reservation_id))
                .ok_or_else(|| {
                    HandlerError::domain(format!("reservation {} not found", reservation_id))
                })?;
            match reservation.status {
                ReservationStatus::Reserved => {
                    reservation.status = ReservationStatus::Cancelled;
                    Ok(reservation.clone())
                }
                ReservationStatus::Cancelled => Err(HandlerError::domain(format!(
                    "reservation {} is already cancelled",
                    reservation_id
                ))),
                ReservationStatus::Completed => Err(HandlerError::domain(format!(
                    "reservation {} has already taken place",
                    reservation_id
                ))),
            }
        })
    }

    fn pause_subscription(&self, user_id: &str) -> Result<SubscriptionRecord, HandlerError> {
        self.set_subscription_status(
            user_id,
            SubscriptionStatus::Active,
            SubscriptionStatus::Paused,
        )
    }

    fn cancel_subscription(&self, user_id: &str) -> Result<SubscriptionRecord, HandlerError> {
        self.update(user_id, |account| {
            let subscription = account
                .subscription
                .as_mut()
                .ok_or_else(|| HandlerError::domain("no subscription on this account"))?;
            if subscription.status == SubscriptionStatus::Cancelled {
                return Err(HandlerError::domain("subscription is already cancelled"));
            }
            subscription.status = SubscriptionStatus::Cancelled;
            Ok(subscription.clone())
        })
    }
}

/// Choose the operation a request asks for
pub fn select_operation(classification: &Classification, text: &str) -> AccountOperation {
    let lower = text.to_lowercase();
    let mentions = |word: &str| lower.contains(word) || classification.has_keyword(word);
    let wants_cancel = mentions("cancel");

    if wants_cancel {
        if let Some(id) = RESERVATION_ID_RE.find(text) {
            return AccountOperation::CancelReservation {
                reservation_id: id.as_str().to_lowercase(),
            };
        }
        if mentions("subscription") || mentions("membership") {
            return AccountOperation::CancelSubscription;
        }
    }
    if mentions("pause") {
        return AccountOperation::PauseSubscription;
    }
    if mentions("subscription") || mentions("quota") || mentions("plan") {
        return AccountOperation::SubscriptionStatus;
    }
    AccountOperation::Lookup
}

fn describe_lookup(snapshot: &AccountSnapshot) -> String {
    let subscription = match &snapshot.subscription {
        Some(s) => format!("{} subscription {}", s.tier, s.status),
        None => "no subscription".to_string(),
    };
    let mut detail = format!(
        "Account for {}: {}, {} active reservation(s)",
        snapshot.user.full_name,
        subscription,
        snapshot.active_reservations().count()
    );
    if snapshot.is_blocked {
        detail.push_str(". ALERT: account is blocked");
    }
    detail
}

fn describe_quota(snapshot: &AccountSnapshot) -> Result<String, HandlerError> {
    let subscription = snapshot
        .subscription
        .as_ref()
        .ok_or_else(|| HandlerError::domain("no subscription on this account"))?;
    let used = snapshot.active_reservations().count() as u32;
    let remaining = subscription.monthly_quota.saturating_sub(used);
    Ok(format!(
        "{} subscription is {}: {} of {} experiences used this month, {} remaining",
        subscription.tier, subscription.status, used, subscription.monthly_quota, remaining
    ))
}

/// Performs the selected account operation for the ticket's user
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountOpsHandler;

impl AccountOpsHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for AccountOpsHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::AccountOps
    }

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        expect_view(HandlerKind::AccountOps, &view)?;
        let StateView::AccountOps {
            classification,
            external_user_id,
            ..
        } = view
        else {
            return Err(HandlerError::MalformedOutput(
                "account handler requires an account view".into(),
            ));
        };
        let text = view
            .latest_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let directory = ctx.services.accounts.as_ref();

        let snapshot = directory
            .snapshot(external_user_id)?
            .ok_or_else(|| HandlerError::domain(format!("user {} not found", external_user_id)))?;
        let operation = select_operation(classification, text);

        if snapshot.is_blocked {
            info!(
                session_id = ctx.session_id,
                user_id = external_user_id,
                "Blocked account, skipping {}",
                operation
            );
            let result = OperationResult {
                operation,
                succeeded: false,
                detail: "account is blocked; no changes were made".into(),
            };
            return Ok(HandlerResult::new(StateDelta::Account {
                snapshot,
                operation: result,
            })
            .with_message("This account is blocked and needs review by our team")
            .recommend(NextStep::Handler(HandlerKind::Escalation)));
        }

        let detail = match &operation {
            AccountOperation::Lookup => describe_lookup(&snapshot),
            AccountOperation::SubscriptionStatus => describe_quota(&snapshot)?,
            AccountOperation::CancelReservation { reservation_id } => {
                let cancelled = directory.cancel_reservation(external_user_id, reservation_id)?;
                format!(
                    "Reservation {} ({}) has been cancelled",
                    cancelled.reservation_id, cancelled.experience
                )
            }
            AccountOperation::PauseSubscription => {
                let sub = directory.pause_subscription(external_user_id)?;
                format!("Your {} subscription is now {}", sub.tier, sub.status)
            }
            AccountOperation::CancelSubscription => {
                let sub = directory.cancel_subscription(external_user_id)?;
                format!("Your {} subscription is now {}", sub.tier, sub.status)
            }
        };

        // Re-read so the snapshot reflects the mutation.
        let snapshot = directory
            .snapshot(external_user_id)?
            .ok_or_else(|| HandlerError::domain(format!("user {} not found", external_user_id)))?;

        debug!(
            session_id = ctx.session_id,
            operation = %operation,
            "Account operation complete"
        );

        Ok(HandlerResult::new(StateDelta::Account {
            snapshot,
            operation: OperationResult {
                operation,
                succeeded: true,
                detail: detail.clone(),
            },
        })
        .with_message(detail)
        .recommend(NextStep::Terminate))
    }
}
