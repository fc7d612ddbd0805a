//! MQTT transport built on rumqttc
//!
//! This module separates pure functions from I/O operations:
//!
//! - [`connection`] - Broker URL handling and option construction
//! - [`message_handler`] - Pure routing of rumqttc events
//! - [`client`] - Event loop task and request I/O
//!
//! # Usage
//!
//! ```rust,no_run
//! use geotemp_link::config::BrokerSection;
//! use geotemp_link::transport::{mqtt::MqttClient, Transport};
//!
//! # tokio_test::block_on(async {
//! let (mut client, mut events) = MqttClient::new(BrokerSection::default())?;
//! client.connect("clientId-1a2b3c4d").await?;
//! let outcome = events.recv().await;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttClient;
pub use connection::{configure_mqtt_options, BrokerEndpoint, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
