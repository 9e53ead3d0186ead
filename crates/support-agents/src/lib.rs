//! Support ticket orchestration: the async supervisor and its handlers.
//!
//! The deterministic pieces (ticket state, routing policy, stores) live in
//! the `coordination` crate; this crate runs them.

pub mod config;
pub mod handlers;
pub mod orchestrator;
pub mod state_machine;
pub mod telemetry;

pub use config::SupportConfig;
pub use orchestrator::{Supervisor, SupervisorError, TurnOutcome, TurnRequest};
