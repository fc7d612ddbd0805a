//! Pure connection configuration for the MQTT transport
//!
//! Broker URL parsing and option construction. Nothing here touches the
//! network.

use crate::config::BrokerSection;
use rumqttc::{MqttOptions, Transport as RumqttcTransport};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] rumqttc::ClientError),
    #[error("Publishing failed: {0}")]
    PublishFailed(#[source] rumqttc::ClientError),
    #[error("Disconnect failed: {0}")]
    DisconnectFailed(#[source] rumqttc::ClientError),
}

/// How the broker is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Tcp,
    Tls,
    WebSocket,
    SecureWebSocket,
}

/// Parsed broker address
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerEndpoint {
    pub kind: StreamKind,
    /// Host name, or the full URL for websocket transports
    pub host: String,
    pub port: u16,
}

impl BrokerEndpoint {
    /// Parse a broker URL such as `wss://test.mosquitto.org:8081/mqtt`
    pub fn parse(broker_url: &str) -> Result<Self, MqttError> {
        let url =
            Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

        let host = url
            .host_str()
            .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

        let (kind, default_port) = match url.scheme() {
            "mqtt" => (StreamKind::Tcp, 1883),
            "mqtts" => (StreamKind::Tls, 8883),
            "ws" => (StreamKind::WebSocket, 80),
            "wss" => (StreamKind::SecureWebSocket, 443),
            _ => return Err(MqttError::InvalidBrokerUrl(broker_url.to_string())),
        };
        let port = url.port().unwrap_or(default_port);

        // rumqttc websocket transports take the whole URL as host
        let host = match kind {
            StreamKind::WebSocket | StreamKind::SecureWebSocket => broker_url.to_string(),
            StreamKind::Tcp | StreamKind::Tls => host.to_string(),
        };

        Ok(Self { kind, host, port })
    }
}

/// Build rumqttc options for one connection attempt
pub fn configure_mqtt_options(
    client_id: &str,
    config: &BrokerSection,
) -> Result<MqttOptions, MqttError> {
    let endpoint = BrokerEndpoint::parse(&config.url)?;
    let mut mqtt_options = MqttOptions::new(client_id, endpoint.host.clone(), endpoint.port);

    match endpoint.kind {
        StreamKind::Tcp => {}
        StreamKind::Tls => {
            mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
        }
        StreamKind::WebSocket => {
            mqtt_options.set_transport(RumqttcTransport::Ws);
        }
        StreamKind::SecureWebSocket => {
            mqtt_options.set_transport(RumqttcTransport::wss_with_default_config());
        }
    }

    if let Some(username) = config.username() {
        let password = config.password().unwrap_or_default();
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
    // Subscriptions are reissued by the session after every connect
    mqtt_options.set_clean_session(true);

    Ok(mqtt_options)
}
