//! Session lifecycle: the connection state machine and the loop that drives it
//!
//! - [`manager`] - `ConnectionManager`, states, events and publish outcomes
//! - [`runner`] - `Session` dispatch loop and its `SessionHandle`
//! - [`thermometer`] - temperature readings for shared reports

pub mod manager;
pub mod runner;
pub mod thermometer;

pub use manager::{
    generate_client_id, ConnectionManager, ConnectionState, DropReason, PendingRetry,
    PublishOutcome, SessionEvent, SessionSnapshot,
};
pub use runner::{Session, SessionCommand, SessionHandle};
pub use thermometer::{FixedThermometer, SimulatedThermometer, Thermometer};
