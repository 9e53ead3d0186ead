//! Invariants that must hold for every turn regardless of ticket content:
//! bounded dispatch, forward-only status, fault absorption and durable
//! history.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coordination::state::{
    Article, Category, EscalationReason, FailureReason, HandlerKind, StateView, TicketState,
};
use coordination::{
    EventBus, InMemoryEscalationLedger, InMemorySessionStore, PolicyConfig, ResolutionStatus,
    SessionStore, StateDelta, StoreError, TurnEvent, TurnEventKind,
};
use support_agents::handlers::escalation::escalation_fields;
use support_agents::handlers::{
    Handler, HandlerContext, HandlerError, HandlerResult, HandlerServices, HandlerSet,
    InMemoryAccountDirectory, KnowledgeBase,
};
use support_agents::orchestrator::GENERIC_FAILURE_RESPONSE;
use support_agents::telemetry::read_events;
use support_agents::{Supervisor, SupportConfig, TurnRequest};

/// Handler that always fails as unavailable.
struct UnavailableHandler {
    kind: HandlerKind,
}

#[async_trait]
impl Handler for UnavailableHandler {
    fn kind(&self) -> HandlerKind {
        self.kind
    }

    async fn run(
        &self,
        _ctx: &HandlerContext<'_>,
        _view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        Err(HandlerError::Unavailable("backend timed out".into()))
    }
}

/// Classifier that never finishes within a turn.
struct StalledClassifier;

#[async_trait]
impl Handler for StalledClassifier {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Classifier
    }

    async fn run(
        &self,
        _ctx: &HandlerContext<'_>,
        _view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(HandlerError::Unavailable("unreachable".into()))
    }
}

/// Session store whose backing is gone.
struct BrokenSessionStore;

#[async_trait]
impl SessionStore for BrokenSessionStore {
    async fn load(&self, _session_id: &str) -> Result<TicketState, StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk unavailable")))
    }

    async fn save(&self, _session_id: &str, _state: &TicketState) -> Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::other("disk unavailable")))
    }
}

/// Session store over memory whose load fails on the listed calls.
struct FlakySessionStore {
    inner: InMemorySessionStore,
    loads: AtomicUsize,
    failing_load: usize,
}

impl FlakySessionStore {
    fn failing_on(failing_load: usize) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            loads: AtomicUsize::new(0),
            failing_load,
        }
    }
}

#[async_trait]
impl SessionStore for FlakySessionStore {
    async fn load(&self, session_id: &str) -> Result<TicketState, StoreError> {
        let call = self.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_load {
            return Err(StoreError::Io(std::io::Error::other("connection reset")));
        }
        self.inner.load(session_id).await
    }

    async fn save(&self, session_id: &str, state: &TicketState) -> Result<(), StoreError> {
        self.inner.save(session_id, state).await
    }
}

/// Session store that never answers the listed operation.
struct HangingSessionStore {
    hang_on_load: bool,
}

#[async_trait]
impl SessionStore for HangingSessionStore {
    async fn load(&self, session_id: &str) -> Result<TicketState, StoreError> {
        if self.hang_on_load {
            std::future::pending::<()>().await;
        }
        Err(StoreError::NotFound(session_id.to_string()))
    }

    async fn save(&self, _session_id: &str, _state: &TicketState) -> Result<(), StoreError> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Escalation handler that reports a reason of its own choosing.
struct MisreportingEscalation;

#[async_trait]
impl Handler for MisreportingEscalation {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Escalation
    }

    async fn run(
        &self,
        _ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        let StateView::Escalation { state } = view else {
            return Err(HandlerError::MalformedOutput("wrong view".into()));
        };
        let fields = escalation_fields(state, EscalationReason::LowConfidence);
        Ok(HandlerResult::new(StateDelta::Escalation(fields)))
    }
}

/// Knowledge base with a single answer at a fixed score.
struct ScoredKnowledgeBase(f64);

impl KnowledgeBase for ScoredKnowledgeBase {
    fn search(
        &self,
        _query: &str,
        _category: Option<Category>,
        _limit: usize,
    ) -> Result<Vec<Article>, HandlerError> {
        Ok(vec![Article {
            article_id: "kb-login".into(),
            title: "How to log in to your account".into(),
            content: "Open the app and tap Log In.".into(),
            score: self.0,
        }])
    }
}

fn with_kb_score(score: f64) -> HandlerServices {
    HandlerServices::new(
        Arc::new(ScoredKnowledgeBase(score)),
        Arc::new(InMemoryAccountDirectory::with_sample_accounts()),
    )
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_every_turn_terminates_within_dispatch_bound() {
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let supervisor = Supervisor::new().with_event_sink(bus);
    let bound = supervisor.policy().config().max_total_dispatches() as usize;

    let messages = [
        ("user-001", "How do I log in?"),
        ("user-001", "I want a refund for last month"),
        ("user-001", "Cancel my reservation res-1002"),
        ("user-001", "Cancel my reservation res-0990"),
        ("user-001", "Pause my subscription"),
        ("user-002", "My account is blocked, help"),
        ("user-003", "How many experiences are left on my subscription?"),
        ("user-404", "Where can I see my bookings?"),
        ("user-001", "asdf qwer zxcv"),
    ];

    for (i, (user, message)) in messages.iter().enumerate() {
        let session = format!("sess-{i}");
        let outcome = supervisor
            .handle_turn(TurnRequest::new(&session, format!("T-{i}"), *user, *message))
            .await
            .unwrap();
        assert!(outcome.status.is_terminal(), "{message}: {:?}", outcome.status);

        let events = drain(&mut rx);
        let dispatched = events
            .iter()
            .filter(|e| e.event_type == TurnEventKind::HandlerDispatched)
            .count();
        assert!(dispatched <= bound, "{message}: {dispatched} dispatches");
        assert_eq!(events.first().unwrap().event_type, TurnEventKind::TurnStarted);
        assert!(events.last().unwrap().event_type.is_terminal());

        if *user == "user-002" {
            assert_ne!(outcome.status, ResolutionStatus::Resolved);
        }
    }
}

#[tokio::test]
async fn test_failed_dispatch_spends_the_handler_budget() {
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let supervisor = Supervisor::new()
        .with_handlers(
            HandlerSet::reference().with_handler(Arc::new(UnavailableHandler {
                kind: HandlerKind::Classifier,
            })),
        )
        .with_event_sink(bus);

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-f", "T-F", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Escalated);
    assert_eq!(
        outcome.escalation_reason,
        Some(EscalationReason::RoutingBudgetExceeded)
    );
    assert_eq!(
        outcome.handlers_invoked,
        vec![HandlerKind::Classifier, HandlerKind::Escalation]
    );

    let failed: Vec<TurnEvent> = drain(&mut rx)
        .into_iter()
        .filter(|e| e.event_type == TurnEventKind::HandlerFailed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].payload["code"], "HANDLER_EXECUTION");
    // Raw causes stay out of events
    assert!(!failed[0].payload.to_string().contains("backend timed out"));
}

#[tokio::test]
async fn test_repeated_failures_escalate_as_handler_failure() {
    let supervisor = Supervisor::new()
        .with_policy(PolicyConfig {
            max_handler_calls_per_turn: 3,
            ..PolicyConfig::default()
        })
        .with_handlers(
            HandlerSet::reference().with_handler(Arc::new(UnavailableHandler {
                kind: HandlerKind::Classifier,
            })),
        );

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-h", "T-H", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(
        outcome.escalation_reason,
        Some(EscalationReason::HandlerFailure)
    );
    let state = supervisor.session("sess-h").await.unwrap().unwrap();
    assert_eq!(state.handler_count(HandlerKind::Classifier), 3);
    assert!(state.classification().is_none());
}

#[tokio::test]
async fn test_escalation_still_recorded_when_escalation_handler_fails() {
    let ledger = Arc::new(InMemoryEscalationLedger::new());
    let supervisor = Supervisor::new()
        .with_handlers(
            HandlerSet::reference().with_handler(Arc::new(UnavailableHandler {
                kind: HandlerKind::Escalation,
            })),
        )
        .with_escalation_ledger(ledger.clone());

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-x", "T-X", "user-001", "I want a refund"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Escalated);
    let escalation_id = outcome.escalation_id.unwrap();
    assert!(escalation_id.starts_with("ESC-"));
    assert!(outcome.response.contains(&escalation_id));
    assert_eq!(ledger.all().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_turn_timeout_fails_and_archives() {
    let supervisor = Supervisor::new()
        .with_handlers(HandlerSet::reference().with_handler(Arc::new(StalledClassifier)))
        .with_turn_timeout(Duration::from_millis(100));

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-t", "T-T", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Failed);
    assert_eq!(outcome.failure_reason, Some(FailureReason::Timeout));
    assert_eq!(outcome.response, GENERIC_FAILURE_RESPONSE);
    assert!(!supervisor.leases().is_held("sess-t"));

    let history = supervisor.recent_history("user-001", 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history.iter().next().unwrap().status,
        ResolutionStatus::Failed
    );
}

#[tokio::test]
async fn test_store_outage_fails_the_turn() {
    let supervisor = Supervisor::new().with_session_store(Arc::new(BrokenSessionStore));

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-s", "T-S", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Failed);
    assert_eq!(outcome.failure_reason, Some(FailureReason::StoreUnavailable));
    assert!(outcome.handlers_invoked.is_empty());
    assert!(!supervisor.leases().is_held("sess-s"));
}

#[tokio::test]
async fn test_failed_load_leaves_stored_session_intact() {
    let store = Arc::new(FlakySessionStore::failing_on(2));
    let supervisor = Supervisor::new().with_session_store(store.clone());

    let first = supervisor
        .handle_turn(TurnRequest::new("sess-l", "T-L", "user-001", "How do I log in?"))
        .await
        .unwrap();
    assert_eq!(first.status, ResolutionStatus::Resolved);
    let before = store.inner.load("sess-l").await.unwrap();

    let second = supervisor
        .handle_turn(TurnRequest::new("sess-l", "T-L", "user-001", "thanks"))
        .await
        .unwrap();
    assert_eq!(second.status, ResolutionStatus::Failed);
    assert_eq!(second.failure_reason, Some(FailureReason::StoreUnavailable));
    assert_eq!(second.response, GENERIC_FAILURE_RESPONSE);

    let after = store.inner.load("sess-l").await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.status(), ResolutionStatus::Resolved);

    let history = supervisor.recent_history("user-001", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(
        history.iter().next().unwrap().status,
        ResolutionStatus::Resolved
    );

    // The store recovers and the session carries on as a follow-up
    let third = supervisor
        .handle_turn(TurnRequest::new("sess-l", "T-L", "user-001", "thanks again"))
        .await
        .unwrap();
    assert!(third.follow_up);
    assert_eq!(third.status, ResolutionStatus::Resolved);
}

#[tokio::test(start_paused = true)]
async fn test_hung_session_load_times_out_and_releases_lease() {
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let supervisor = Supervisor::new()
        .with_session_store(Arc::new(HangingSessionStore { hang_on_load: true }))
        .with_turn_timeout(Duration::from_millis(100))
        .with_event_sink(bus);

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-z", "T-Z", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Failed);
    assert_eq!(outcome.failure_reason, Some(FailureReason::Timeout));
    assert!(outcome.handlers_invoked.is_empty());
    assert!(!supervisor.leases().is_held("sess-z"));
    let kinds: Vec<TurnEventKind> = drain(&mut rx).iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![TurnEventKind::TurnStarted, TurnEventKind::TurnFailed]
    );
}

#[tokio::test(start_paused = true)]
async fn test_hung_session_save_does_not_hold_the_lease() {
    let supervisor = Supervisor::new()
        .with_session_store(Arc::new(HangingSessionStore { hang_on_load: false }))
        .with_turn_timeout(Duration::from_millis(100));

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-w", "T-W", "user-001", "How do I log in?"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Resolved);
    assert!(!supervisor.leases().is_held("sess-w"));
    assert_eq!(
        supervisor.recent_history("user-001", 5).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_escalation_reason_comes_from_the_policy() {
    let bus = Arc::new(EventBus::new());
    let mut rx = bus.subscribe();
    let ledger = Arc::new(InMemoryEscalationLedger::new());
    let supervisor = Supervisor::new()
        .with_handlers(HandlerSet::reference().with_handler(Arc::new(MisreportingEscalation)))
        .with_escalation_ledger(ledger.clone())
        .with_event_sink(bus);

    let outcome = supervisor
        .handle_turn(TurnRequest::new("sess-m", "T-M", "user-001", "I want a refund"))
        .await
        .unwrap();

    assert_eq!(outcome.status, ResolutionStatus::Escalated);
    assert_eq!(
        outcome.escalation_reason,
        Some(EscalationReason::RefundOrDispute)
    );
    let records = ledger.all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].reason, EscalationReason::RefundOrDispute);

    let history = supervisor.recent_history("user-001", 5).await.unwrap();
    assert_eq!(
        history.iter().next().unwrap().escalation_reason,
        Some(EscalationReason::RefundOrDispute)
    );
    assert!(drain(&mut rx)
        .iter()
        .any(|e| e.event_type == TurnEventKind::HandlerFailed));
}

#[tokio::test]
async fn test_follow_up_never_reopens_or_rearchives() {
    let supervisor = Supervisor::new();
    let first = supervisor
        .handle_turn(TurnRequest::new("sess-u", "T-U", "user-001", "How do I log in?"))
        .await
        .unwrap();
    assert_eq!(first.status, ResolutionStatus::Resolved);

    for message in ["Thanks!", "Actually I want a refund"] {
        let next = supervisor
            .handle_turn(TurnRequest::new("sess-u", "T-U", "user-001", message))
            .await
            .unwrap();
        assert!(next.follow_up);
        assert_eq!(next.status, ResolutionStatus::Resolved);
        assert_eq!(next.response, first.response);
    }

    let state = supervisor.session("sess-u").await.unwrap().unwrap();
    assert_eq!(state.turn(), 3);
    assert_eq!(
        supervisor.recent_history("user-001", 10).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_repeat_escalations_raise_the_confidence_bar() {
    let supervisor = Supervisor::new().with_services(with_kb_score(0.55));

    for i in 0..2 {
        let outcome = supervisor
            .handle_turn(TurnRequest::new(
                format!("sess-p{i}"),
                format!("T-P{i}"),
                "user-001",
                "I want a refund",
            ))
            .await
            .unwrap();
        assert_eq!(outcome.status, ResolutionStatus::Escalated);
    }

    // 0.55 clears the 0.5 default but not 0.5 + 0.1 for a repeat escalator
    let repeat = supervisor
        .handle_turn(TurnRequest::new("sess-p2", "T-P2", "user-001", "How do I log in?"))
        .await
        .unwrap();
    assert_eq!(repeat.escalation_reason, Some(EscalationReason::LowConfidence));

    let state = supervisor.session("sess-p2").await.unwrap().unwrap();
    assert!(state
        .message_log()
        .iter()
        .any(|m| m.content.contains("2 previous ticket(s), 2 escalated")));

    let fresh = supervisor
        .handle_turn(TurnRequest::new("sess-p3", "T-P3", "user-003", "How do I log in?"))
        .await
        .unwrap();
    assert_eq!(fresh.status, ResolutionStatus::Resolved);
}

#[tokio::test]
async fn test_file_backed_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SupportConfig {
        state_dir: Some(dir.path().join("state")),
        telemetry_path: Some(dir.path().join("events.jsonl")),
        ..SupportConfig::default()
    };

    let first = Supervisor::from_config(&config).await.unwrap();
    let outcome = first
        .handle_turn(TurnRequest::new("sess-k", "T-K", "user-001", "I want a refund"))
        .await
        .unwrap();
    assert_eq!(outcome.status, ResolutionStatus::Escalated);
    first.shutdown().await;

    let restarted = Supervisor::from_config(&config).await.unwrap();
    let stored = restarted.session("sess-k").await.unwrap().unwrap();
    assert_eq!(stored.status(), ResolutionStatus::Escalated);
    assert_eq!(
        stored.resolution().escalation_id,
        outcome.escalation_id
    );

    let follow_up = restarted
        .handle_turn(TurnRequest::new("sess-k", "T-K", "user-001", "Any news?"))
        .await
        .unwrap();
    assert!(follow_up.follow_up);
    assert_eq!(follow_up.escalation_id, outcome.escalation_id);

    let history = restarted.recent_history("user-001", 5).await.unwrap();
    assert_eq!(history.len(), 1);

    let ledger = std::fs::read_to_string(dir.path().join("state").join("escalations.jsonl")).unwrap();
    assert_eq!(ledger.lines().count(), 1);

    // Telemetry is written off the routing loop; shutdown drains it
    restarted.shutdown().await;

    let events = read_events(&dir.path().join("events.jsonl")).unwrap();
    assert!(events
        .iter()
        .any(|e| e.event_type == TurnEventKind::TurnEscalated));
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type == TurnEventKind::TurnStarted)
            .count(),
        2
    );
}
