//! Turn events: structured observability for the routing loop
//!
//! # Event Flow
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │  Supervisor  │────▶│  Event Bus   │────▶│  Subscribers │
//! │   (emit)     │     │  (broadcast) │     │ (telemetry)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Publishing never blocks or fails the turn.

pub mod bus;
pub mod types;

pub use bus::{EventBus, EventSink, SharedEventBus};
pub use types::{TurnEvent, TurnEventKind};
