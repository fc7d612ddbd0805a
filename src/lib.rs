//! geotemp-link
//!
//! A live publish/subscribe link that shares a client's position and
//! temperature over MQTT and renders the readings peers share back.
//!
//! # Overview
//!
//! - [`geo`] - continuous position acquisition (gpsd or a fixed position)
//! - [`protocol`] - GeoJSON status report codec, topic naming and classification
//! - [`transport`] - MQTT transport over TCP, TLS or WebSocket
//! - [`session`] - connection state machine with a single reconnect after loss
//! - [`view`] - terminal command parsing and rendering
//!
//! # Quick Start
//!
//! ```rust
//! use geotemp_link::protocol::{classify, decode_status_report, encode_status_report, DisplayCategory, Position};
//!
//! let payload = encode_status_report(Position::new(51.05, -114.07), -5);
//! assert!(payload.contains("[-114.07,51.05]"));
//!
//! let report = decode_status_report(&payload).unwrap();
//! assert_eq!(classify(report.temperature), DisplayCategory::Low);
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod observability;
pub mod protocol;
pub mod session;
pub mod testing;
pub mod transport;
pub mod view;

pub use config::*;
pub use error::{LinkError, LinkResult};
pub use protocol::*;
pub use session::{ConnectionManager, ConnectionState, Session, SessionEvent, SessionHandle};
pub use transport::mqtt::MqttClient;
