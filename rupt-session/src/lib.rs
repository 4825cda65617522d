//! Rupt Session - device-session orchestration
//!
//! Builds on `rupt-client` to enforce the concurrent-device limit and react
//! to remote logout, exposing consumer hooks as named event subscriptions.

pub mod controller;
pub mod events;
pub mod limit;
pub mod state;

pub use controller::{RealtimeLogout, SessionController, SessionDeps, SessionOptions};
pub use events::{EventBus, EventKind, ListenerId, SessionEvent};
pub use limit::{LimitDecision, LimitInputs, LimitPolicy};
pub use state::DeviceListState;
