//! Transport layer for the pub/sub link
//!
//! Requests go through the [`Transport`] trait. Outcomes and inbound traffic
//! come back as [`TransportEvent`]s on a channel, so the session can fold
//! them onto its single dispatch loop.

pub mod mqtt;

/// Events reported asynchronously by a transport
///
/// Connection-level events carry the client id of the attempt they belong
/// to, letting the session discard events from an abandoned attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Broker accepted the connection
    ConnectSucceeded { client_id: String },
    /// Connection attempt failed before the broker accepted it
    ConnectFailed { client_id: String, reason: String },
    /// Established connection dropped unexpectedly
    ConnectionLost { client_id: String, reason: String },
    /// Message arrived on a subscribed topic
    MessageArrived { topic: String, payload: Vec<u8> },
}

/// Transport trait for the link
///
/// `connect` only initiates the attempt; success or failure is reported
/// later as a [`TransportEvent`]. Subscriptions do not survive a
/// transport-level disconnect.
#[async_trait::async_trait]
pub trait Transport: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Start connecting with the given client id, replacing any previous connection
    async fn connect(&mut self, client_id: &str) -> Result<(), Self::Error>;

    /// Subscribe the current connection to a topic
    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error>;

    /// Publish a payload, at most once and unacknowledged
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error>;

    /// Tear down the current connection
    async fn disconnect(&mut self) -> Result<(), Self::Error>;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttClient;
