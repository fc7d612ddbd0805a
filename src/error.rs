//! Crate-level error type
//!
//! Each layer has its own error enum; `LinkError` unifies them for callers
//! that drive a whole session, such as the CLI.

use crate::config::ConfigError;
use crate::geo::GeoError;
use crate::protocol::DecodeError;
use crate::transport::mqtt::MqttError;
use thiserror::Error;

/// Main error type for link operations
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] MqttError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Geolocation error: {0}")]
    Geo(#[from] GeoError),

    #[error("Session is no longer running")]
    SessionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;
