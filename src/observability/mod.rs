//! Observability for the link
//!
//! Structured logging only; see [`logging`].

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};

// Span macros for structured logging
pub use logging::{mqtt_span, session_span};
