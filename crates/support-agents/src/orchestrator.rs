//! Supervisor: runs one support turn through classify → route → dispatch →
//! resolve or escalate.
//!
//! Each turn holds the session lease, loads or creates the ticket state,
//! enriches it with the user's recent history, then loops over the routing
//! policy until the ticket reaches a terminal status. Handler faults are
//! absorbed into the turn budget; only input validation and lease
//! contention reach the caller.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use coordination::escalation::ResolutionPath;
use coordination::state::{
    EscalationReason, FailureReason, HandlerDelta, HandlerKind, StateDelta, TicketState,
};
use coordination::{
    CoordinationError, EscalationLedger, EscalationRecord, EventBus, EventSink, FileEscalationLedger,
    FileHistoryArchive, FileSessionStore, HistoryArchive, HistoryEntry, HistoryInsight,
    InMemoryEscalationLedger, InMemoryHistoryArchive, InMemorySessionStore, PolicyConfig,
    RecentEntries, ResolutionStatus, RetentionPolicy, RouteDecision, RoutingPolicy, SessionLeases,
    SessionStore, StoreError, TurnEvent, TurnLedger,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SupportConfig;
use crate::handlers::escalation::escalation_fields;
use crate::handlers::{HandlerContext, HandlerServices, HandlerSet, NextStep};
use crate::state_machine::{TransitionRecord, TurnPhase, TurnStateMachine};
use crate::telemetry::JsonlTelemetry;

/// Response sent when a turn fails for infrastructure reasons
pub const GENERIC_FAILURE_RESPONSE: &str =
    "We were unable to complete your request right now. Please try again shortly.";

const DEFAULT_CHANNEL: &str = "chat";

/// Errors returned to the caller of [`Supervisor::handle_turn`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Session {0} is busy with another turn")]
    SessionBusy(String),
}

impl From<CoordinationError> for SupervisorError {
    fn from(err: CoordinationError) -> Self {
        match err {
            CoordinationError::SessionBusy { session_id } => Self::SessionBusy(session_id),
            CoordinationError::InvalidInput { message } => Self::InvalidInput(message),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

/// One inbound user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub ticket_id: String,
    pub external_user_id: String,
    pub channel: String,
    pub message: String,
}

impl TurnRequest {
    pub fn new(
        session_id: impl Into<String>,
        ticket_id: impl Into<String>,
        external_user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            ticket_id: ticket_id.into(),
            external_user_id: external_user_id.into(),
            channel: DEFAULT_CHANNEL.to_string(),
            message: message.into(),
        }
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    fn validate(&self) -> Result<(), SupervisorError> {
        for (name, value) in [
            ("session_id", &self.session_id),
            ("ticket_id", &self.ticket_id),
            ("external_user_id", &self.external_user_id),
            ("message", &self.message),
        ] {
            if value.trim().is_empty() {
                return Err(SupervisorError::InvalidInput(format!(
                    "{name} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// What the submitter gets back from a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub session_id: String,
    pub ticket_id: String,
    pub turn: u32,
    pub status: ResolutionStatus,
    /// Text for the submitter
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escalation_reason: Option<EscalationReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// The session was already closed; the stored outcome is returned
    pub follow_up: bool,
    pub handlers_invoked: Vec<HandlerKind>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

impl TurnOutcome {
    fn from_state(state: &TicketState, follow_up: bool, transitions: Vec<TransitionRecord>) -> Self {
        let resolution = state.resolution();
        Self {
            session_id: state.session_id().to_string(),
            ticket_id: state.ticket_id().to_string(),
            turn: state.turn(),
            status: resolution.status,
            response: resolution
                .final_response
                .clone()
                .unwrap_or_else(|| GENERIC_FAILURE_RESPONSE.to_string()),
            summary: resolution.summary.clone(),
            escalation_id: resolution.escalation_id.clone(),
            escalation_reason: state.decision().escalation_reason,
            failure_reason: resolution.failure_reason,
            follow_up,
            handlers_invoked: state.handlers_invoked().to_vec(),
            transitions,
        }
    }
}

/// The central routing loop.
pub struct Supervisor {
    handlers: HandlerSet,
    services: HandlerServices,
    sessions: Arc<dyn SessionStore>,
    history: Arc<dyn HistoryArchive>,
    ledger: Arc<dyn EscalationLedger>,
    events: Option<Arc<dyn EventSink>>,
    leases: SessionLeases,
    policy: RoutingPolicy,
    retention: RetentionPolicy,
    history_limit: usize,
    turn_timeout: Duration,
    telemetry_writer: Option<JoinHandle<usize>>,
}

impl Supervisor {
    /// Reference handlers over in-memory stores
    pub fn new() -> Self {
        let config = SupportConfig::default();
        Self {
            handlers: HandlerSet::reference(),
            services: HandlerServices::reference(),
            sessions: Arc::new(InMemorySessionStore::new()),
            history: Arc::new(InMemoryHistoryArchive::new()),
            ledger: Arc::new(InMemoryEscalationLedger::new()),
            events: None,
            leases: SessionLeases::new(),
            policy: RoutingPolicy::with_config(config.policy.clone()),
            retention: RetentionPolicy::new(config.max_message_log),
            history_limit: config.history_limit,
            turn_timeout: config.turn_timeout(),
            telemetry_writer: None,
        }
    }

    /// Build from configuration, opening file-backed stores under
    /// `state_dir` when one is set.
    pub async fn from_config(config: &SupportConfig) -> Result<Self> {
        let mut supervisor = Self::new()
            .with_policy(config.policy.clone())
            .with_retention(RetentionPolicy::new(config.max_message_log))
            .with_history_limit(config.history_limit)
            .with_turn_timeout(config.turn_timeout());

        if let Some(dir) = &config.state_dir {
            let sessions = FileSessionStore::open(dir.join("sessions"))
                .await
                .context(format!("Failed to open session store in {}", dir.display()))?;
            let history = FileHistoryArchive::open(dir.join("history"))
                .await
                .context(format!("Failed to open history archive in {}", dir.display()))?;
            let ledger = FileEscalationLedger::open(dir.join("escalations.jsonl"))
                .await
                .context(format!("Failed to open escalation ledger in {}", dir.display()))?;
            supervisor = supervisor
                .with_session_store(Arc::new(sessions))
                .with_history_archive(Arc::new(history))
                .with_escalation_ledger(Arc::new(ledger));
        }
        if let Some(path) = &config.telemetry_path {
            let bus = EventBus::new().shared();
            supervisor.telemetry_writer = Some(JsonlTelemetry::new(path).spawn(bus.subscribe()));
            supervisor = supervisor.with_event_sink(bus);
        }
        Ok(supervisor)
    }

    /// Drop the event sink and wait for the telemetry writer to drain it
    pub async fn shutdown(mut self) {
        let writer = self.telemetry_writer.take();
        drop(self);
        if let Some(handle) = writer {
            match handle.await {
                Ok(written) => debug!(written, "Telemetry writer drained"),
                Err(e) => warn!("Telemetry writer failed: {e}"),
            }
        }
    }

    pub fn with_handlers(mut self, handlers: HandlerSet) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_services(mut self, services: HandlerServices) -> Self {
        self.services = services;
        self
    }

    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = store;
        self
    }

    pub fn with_history_archive(mut self, archive: Arc<dyn HistoryArchive>) -> Self {
        self.history = archive;
        self
    }

    pub fn with_escalation_ledger(mut self, ledger: Arc<dyn EscalationLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn with_policy(mut self, config: PolicyConfig) -> Self {
        self.policy = RoutingPolicy::with_config(config);
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn leases(&self) -> &SessionLeases {
        &self.leases
    }

    pub fn turn_timeout(&self) -> Duration {
        self.turn_timeout
    }

    /// Stored state for a session, if any
    pub async fn session(&self, session_id: &str) -> Result<Option<TicketState>, StoreError> {
        self.sessions.find(session_id).await
    }

    /// A user's most recent archived tickets, newest first
    pub async fn recent_history(
        &self,
        external_user_id: &str,
        limit: usize,
    ) -> Result<RecentEntries, StoreError> {
        self.history.recent(external_user_id, limit).await
    }

    fn emit(&self, event: TurnEvent) {
        if let Some(sink) = &self.events {
            sink.emit(event);
        }
    }

    fn advance(&self, sm: &mut TurnStateMachine, to: TurnPhase, reason: Option<&str>) {
        if let Err(e) = sm.advance(to, reason) {
            warn!("{e}");
        }
    }

    /// Process one user message for a session.
    ///
    /// Returns an outcome for every turn that gets past validation and the
    /// session lease, including failed ones.
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnOutcome, SupervisorError> {
        request.validate()?;
        let _lease = self.leases.acquire(&request.session_id)?;
        let mut sm = TurnStateMachine::new();
        let deadline = Instant::now() + self.turn_timeout;

        let loaded = match tokio::time::timeout_at(deadline, self.sessions.find(&request.session_id))
            .await
        {
            Ok(Ok(found)) => Ok(found),
            Ok(Err(e)) => {
                warn!(session_id = %request.session_id, error = %e, "Session store unavailable");
                Err(FailureReason::StoreUnavailable)
            }
            Err(_) => {
                warn!(session_id = %request.session_id, "Session load timed out");
                Err(FailureReason::Timeout)
            }
        };

        let mut state = match loaded {
            Ok(Some(mut state)) => {
                if state.ticket_id() != request.ticket_id
                    || state.external_user_id() != request.external_user_id
                {
                    return Err(SupervisorError::InvalidInput(format!(
                        "session {} belongs to a different ticket or user",
                        request.session_id
                    )));
                }
                state.begin_follow_up(request.message.clone())?;
                if state.status().is_terminal() {
                    return Ok(self.follow_up(state).await);
                }
                state
            }
            Ok(None) => TicketState::create(
                &request.session_id,
                &request.ticket_id,
                &request.external_user_id,
                &request.channel,
                &request.message,
            )?,
            Err(reason) => {
                // Placeholder only; the stored session is left untouched
                let mut state = TicketState::create(
                    &request.session_id,
                    &request.ticket_id,
                    &request.external_user_id,
                    &request.channel,
                    &request.message,
                )?;
                self.emit(TurnEvent::turn_started(
                    state.session_id(),
                    state.ticket_id(),
                    state.turn(),
                    false,
                ));
                self.fail_turn(&mut state, &mut sm, reason);
                self.archive(&state).await;
                return Ok(TurnOutcome::from_state(&state, false, sm.transitions().to_vec()));
            }
        };

        info!(
            session_id = %state.session_id(),
            ticket_id = %state.ticket_id(),
            turn = state.turn(),
            "Turn started"
        );
        self.emit(TurnEvent::turn_started(
            state.session_id(),
            state.ticket_id(),
            state.turn(),
            false,
        ));
        self.retention.apply(&mut state);

        let timed_out = tokio::time::timeout_at(deadline, self.run_turn(&mut state, &mut sm))
            .await
            .is_err();
        if timed_out {
            let err = CoordinationError::Timeout {
                timeout_ms: self.turn_timeout.as_millis() as u64,
            };
            warn!(session_id = %state.session_id(), "{err}");
            if !state.status().is_terminal() {
                self.fail_turn(&mut state, &mut sm, FailureReason::Timeout);
            }
        }

        Ok(self.finish(state, sm).await)
    }

    /// A message on a closed session: record it, keep the outcome
    async fn follow_up(&self, mut state: TicketState) -> TurnOutcome {
        state.note(format!(
            "Follow-up received after the ticket was {}; outcome unchanged",
            state.status()
        ));
        self.emit(TurnEvent::turn_started(
            state.session_id(),
            state.ticket_id(),
            state.turn(),
            true,
        ));
        self.retention.apply(&mut state);
        if let Err(e) = self
            .bounded(self.sessions.save(state.session_id(), &state))
            .await
        {
            warn!(session_id = %state.session_id(), error = %e, "Failed to save session");
        }
        info!(
            session_id = %state.session_id(),
            status = %state.status(),
            "Follow-up on closed ticket"
        );
        TurnOutcome::from_state(&state, true, Vec::new())
    }

    /// Enrichment plus the routing loop; runs under the turn deadline
    async fn run_turn(&self, state: &mut TicketState, sm: &mut TurnStateMachine) {
        let window = self.policy.config().repeat_escalation_window;
        let insight = match self
            .history
            .recent(state.external_user_id(), self.history_limit)
            .await
        {
            Ok(entries) => HistoryInsight::analyze(&entries, window),
            Err(e) => {
                warn!(session_id = %state.session_id(), error = %e, "History unavailable");
                HistoryInsight::default()
            }
        };
        if let Some(note) = insight.context_note() {
            debug!(session_id = %state.session_id(), "{note}");
            state.note(note);
        }

        self.advance(sm, TurnPhase::Routing, None);
        self.route(state, sm, &insight).await;
    }

    async fn route(&self, state: &mut TicketState, sm: &mut TurnStateMachine, insight: &HistoryInsight) {
        let mut ledger = TurnLedger::new();
        let max_total = self.policy.config().max_total_dispatches();

        while !state.status().is_terminal() {
            let decision = if ledger.dispatches >= max_total {
                RouteDecision::Escalate(EscalationReason::RoutingBudgetExceeded)
            } else {
                self.policy.decide(state, &ledger, insight)
            };
            debug!(
                session_id = %state.session_id(),
                decision = %decision,
                dispatches = ledger.dispatches,
                "Routing decision"
            );

            match decision {
                RouteDecision::Dispatch(handler) => {
                    self.advance(sm, TurnPhase::Dispatching, Some(handler.as_str()));
                    self.dispatch(handler, state, &mut ledger).await;
                    sm.set_dispatch(ledger.dispatches);
                    self.advance(sm, TurnPhase::Routing, None);
                }
                RouteDecision::Resolve(path) => {
                    state.allow_auto_resolve();
                    let (response, summary) = resolution_text(state, path);
                    match state.resolve(response, summary) {
                        Ok(()) => {
                            self.advance(sm, TurnPhase::Resolved, Some(&decision.to_string()));
                            info!(
                                session_id = %state.session_id(),
                                ticket_id = %state.ticket_id(),
                                dispatches = ledger.dispatches,
                                "Ticket resolved"
                            );
                            self.emit(TurnEvent::turn_resolved(
                                state.session_id(),
                                state.ticket_id(),
                                ledger.dispatches,
                            ));
                        }
                        Err(e) => {
                            warn!(session_id = %state.session_id(), "Resolution refused: {e}");
                            self.escalate(state, sm, EscalationReason::NoResolutionPath)
                                .await;
                        }
                    }
                }
                RouteDecision::Escalate(reason) => {
                    self.escalate(state, sm, reason).await;
                }
            }
        }
    }

    /// Run one non-escalation handler and merge its delta
    async fn dispatch(&self, handler: HandlerKind, state: &mut TicketState, ledger: &mut TurnLedger) {
        let session_id = state.session_id().to_string();
        let ticket_id = state.ticket_id().to_string();
        let base_generation = state.generation();
        ledger.record_dispatch();
        self.emit(TurnEvent::handler_dispatched(
            &session_id,
            &ticket_id,
            handler,
            base_generation,
        ));

        let result = match state.view_for(handler) {
            Some(view) => {
                let ctx = HandlerContext {
                    session_id: &session_id,
                    ticket_id: &ticket_id,
                    turn: state.turn(),
                    services: &self.services,
                };
                self.handlers
                    .get(handler)
                    .run(&ctx, view)
                    .await
                    .map_err(|e| {
                        debug!(%handler, kind = %e.kind(), "Handler returned an error");
                        CoordinationError::handler(handler, e.to_string())
                    })
            }
            None => Err(CoordinationError::handler(
                handler,
                "ticket has no classification yet",
            )),
        };

        let outcome = result.and_then(|result| {
            if let Some(NextStep::Handler(next)) = result.recommended_next {
                debug!(%handler, %next, "Handler recommended next step");
                ledger.recommended_next = Some(next);
            }
            let delta = HandlerDelta::new(base_generation, result.delta, result.messages);
            state.apply_delta(handler, delta)
        });

        match outcome {
            Ok(()) => {}
            Err(err @ CoordinationError::StaleDelta { .. }) => {
                warn!(session_id = %session_id, "{err}; delta discarded");
                state.record_invocation(handler);
                state.note(format!("{handler} output discarded: state changed while it ran"));
            }
            Err(err) => {
                ledger.record_failure();
                warn!(
                    session_id = %session_id,
                    %handler,
                    failures = ledger.failures,
                    "{err}"
                );
                state.record_invocation(handler);
                state.note(format!("{handler} handler failed: {err}"));
                self.emit(TurnEvent::handler_failed(
                    &session_id,
                    &ticket_id,
                    handler,
                    err.code(),
                    ledger.failures,
                ));
            }
        }
    }

    /// Mark for escalation, run the escalation handler once and record it
    async fn escalate(&self, state: &mut TicketState, sm: &mut TurnStateMachine, reason: EscalationReason) {
        let session_id = state.session_id().to_string();
        let ticket_id = state.ticket_id().to_string();
        state.require_escalation(reason);
        self.advance(sm, TurnPhase::Escalating, Some(&reason.to_string()));
        self.emit(TurnEvent::handler_dispatched(
            &session_id,
            &ticket_id,
            HandlerKind::Escalation,
            state.generation(),
        ));

        let fields = match self.run_escalation_handler(state).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(session_id = %session_id, "{err}; recording escalation directly");
                self.emit(TurnEvent::handler_failed(
                    &session_id,
                    &ticket_id,
                    HandlerKind::Escalation,
                    err.code(),
                    1,
                ));
                state.record_invocation(HandlerKind::Escalation);
                let fields = escalation_fields(state, reason);
                if let Err(e) = state.close_escalated(&fields) {
                    warn!(session_id = %session_id, "Cannot close ticket as escalated: {e}");
                    self.fail_turn(state, sm, FailureReason::StoreUnavailable);
                    return;
                }
                state.note(fields.confirmation.clone());
                fields
            }
        };

        let record = EscalationRecord::from_fields(state, &fields);
        match self.ledger.record(record).await {
            Ok(true) => debug!(escalation_id = %fields.escalation_id, "Escalation recorded"),
            Ok(false) => debug!(escalation_id = %fields.escalation_id, "Escalation already recorded"),
            Err(e) => warn!(session_id = %session_id, error = %e, "Failed to record escalation"),
        }

        self.advance(sm, TurnPhase::Escalated, None);
        info!(
            session_id = %session_id,
            ticket_id = %ticket_id,
            %reason,
            escalation_id = %fields.escalation_id,
            "Ticket escalated"
        );
        self.emit(TurnEvent::turn_escalated(
            &session_id,
            &ticket_id,
            reason,
            &fields.escalation_id,
        ));
    }

    async fn run_escalation_handler(
        &self,
        state: &mut TicketState,
    ) -> Result<coordination::EscalationFields, CoordinationError> {
        let session_id = state.session_id().to_string();
        let ticket_id = state.ticket_id().to_string();
        let base_generation = state.generation();
        let view = state
            .view_for(HandlerKind::Escalation)
            .ok_or_else(|| CoordinationError::handler(HandlerKind::Escalation, "no view"))?;
        let ctx = HandlerContext {
            session_id: &session_id,
            ticket_id: &ticket_id,
            turn: state.turn(),
            services: &self.services,
        };
        let result = self
            .handlers
            .get(HandlerKind::Escalation)
            .run(&ctx, view)
            .await
            .map_err(|e| CoordinationError::handler(HandlerKind::Escalation, e.to_string()))?;

        let StateDelta::Escalation(fields) = &result.delta else {
            return Err(CoordinationError::handler(
                HandlerKind::Escalation,
                format!("returned a {} delta", result.delta.handler()),
            ));
        };
        let decided = state.decision().escalation_reason;
        if decided != Some(fields.reason) {
            return Err(CoordinationError::handler(
                HandlerKind::Escalation,
                format!(
                    "recorded reason {} but the ticket was escalated for {}",
                    fields.reason,
                    decided.map_or_else(|| "no reason".to_string(), |r| r.to_string())
                ),
            ));
        }
        let fields = fields.clone();
        state.apply_delta(
            HandlerKind::Escalation,
            HandlerDelta::new(base_generation, result.delta, result.messages),
        )?;
        Ok(fields)
    }

    fn fail_turn(&self, state: &mut TicketState, sm: &mut TurnStateMachine, reason: FailureReason) {
        if let Err(e) = state.fail(reason, GENERIC_FAILURE_RESPONSE) {
            warn!(session_id = %state.session_id(), "Cannot mark turn failed: {e}");
            return;
        }
        if let Err(e) = sm.fail(&reason.to_string()) {
            debug!("{e}");
        }
        warn!(
            session_id = %state.session_id(),
            ticket_id = %state.ticket_id(),
            %reason,
            "Turn failed"
        );
        self.emit(TurnEvent::turn_failed(
            state.session_id(),
            state.ticket_id(),
            reason,
        ));
    }

    /// Run one store call under its own deadline
    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.turn_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("store call exceeded {} ms", self.turn_timeout.as_millis()),
            ))),
        }
    }

    /// Append the terminal outcome to the user's history; a ticket already
    /// archived keeps its first entry
    async fn archive(&self, state: &TicketState) {
        let entry = HistoryEntry::from_state(state);
        match self
            .bounded(self.history.append(state.external_user_id(), entry))
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(ticket_id = %state.ticket_id(), "History entry already archived"),
            Err(e) => warn!(session_id = %state.session_id(), error = %e, "Failed to archive history"),
        }
    }

    /// Archive, persist and build the outcome for a terminal turn
    async fn finish(&self, mut state: TicketState, sm: TurnStateMachine) -> TurnOutcome {
        if let Some(report) = self.retention.apply(&mut state) {
            debug!(compacted = report.messages_compacted, "Message log compacted");
        }

        self.archive(&state).await;
        if let Err(e) = self
            .bounded(self.sessions.save(state.session_id(), &state))
            .await
        {
            warn!(session_id = %state.session_id(), error = %e, "Failed to save session");
        }

        info!(
            summary = %state.summary(),
            phases = %sm.summary(),
            "Turn complete"
        );
        TurnOutcome::from_state(&state, false, sm.transitions().to_vec())
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Submitter response and reviewer summary for an automatic resolution
fn resolution_text(state: &TicketState, path: ResolutionPath) -> (String, String) {
    match path {
        ResolutionPath::Knowledge => match state
            .knowledge_result()
            .and_then(|r| r.top().map(|top| (r, top)))
        {
            Some((result, top)) => (
                format!("Here is what I found in \"{}\": {}", top.title, top.content),
                format!(
                    "Resolved via knowledge article {} (confidence {:.2})",
                    top.article_id, result.confidence
                ),
            ),
            None => (String::new(), "Resolved via knowledge base".to_string()),
        },
        ResolutionPath::AccountOperation => match state.last_operation() {
            Some(op) => (
                op.detail.clone(),
                format!(
                    "Resolved by {} for user {}",
                    op.operation,
                    state.external_user_id()
                ),
            ),
            None => (String::new(), "Resolved by account operation".to_string()),
        },
    }
}
