//! Session configuration
//!
//! Loaded from a TOML file. Every section has defaults matching the public
//! test broker deployment, so an empty file is a valid configuration.

use crate::protocol::{
    validate_topic_name, Position, TopicBuilder, DEFAULT_SHARED_TOPIC, DEFAULT_TOPIC_PREFIX,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LinkConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub topics: TopicsSection,
    #[serde(default)]
    pub reconnect: ReconnectSection,
    #[serde(default)]
    pub geo: GeoSection,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL: `mqtt://`, `mqtts://`, `ws://` or `wss://`
    #[serde(default = "default_broker_url")]
    pub url: String,
    /// Environment variable containing username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_env: Option<String>,
    /// Environment variable containing password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Upper bound on waiting for the broker's ConnAck
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_broker_url() -> String {
    "wss://test.mosquitto.org:8081/mqtt".to_string()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            url: default_broker_url(),
            username_env: None,
            password_env: None,
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl BrokerSection {
    /// Username read from the configured environment variable
    pub fn username(&self) -> Option<String> {
        get_env_var_optional(self.username_env.as_ref())
    }

    /// Password read from the configured environment variable
    pub fn password(&self) -> Option<String> {
        get_env_var_optional(self.password_env.as_ref())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Topic namespace
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicsSection {
    /// Topic status reports are shared on
    #[serde(default = "default_shared_topic")]
    pub shared: String,
    /// Prefix user-addressed topics are scoped under
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_shared_topic() -> String {
    DEFAULT_SHARED_TOPIC.to_string()
}

fn default_prefix() -> String {
    DEFAULT_TOPIC_PREFIX.to_string()
}

impl Default for TopicsSection {
    fn default() -> Self {
        Self {
            shared: default_shared_topic(),
            prefix: default_prefix(),
        }
    }
}

impl TopicsSection {
    pub fn builder(&self) -> TopicBuilder {
        TopicBuilder::new(self.shared.clone(), self.prefix.clone())
    }
}

/// Retry after an unexpected connection loss
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectSection {
    /// Delay before the single retry, in milliseconds
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
}

fn default_retry_delay() -> u64 {
    3000
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay(),
        }
    }
}

impl ReconnectSection {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Position provider selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GeoProviderKind {
    #[default]
    Gpsd,
    Fixed,
}

/// Geolocation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoSection {
    #[serde(default)]
    pub provider: GeoProviderKind,
    /// gpsd daemon address
    #[serde(default = "default_gpsd_addr")]
    pub gpsd_addr: String,
    /// Position used by the fixed provider
    #[serde(default = "default_fixed_position")]
    pub fixed: Position,
}

fn default_gpsd_addr() -> String {
    "127.0.0.1:2947".to_string()
}

fn default_fixed_position() -> Position {
    Position::new(51.05, -114.07)
}

impl Default for GeoSection {
    fn default() -> Self {
        Self {
            provider: GeoProviderKind::default(),
            gpsd_addr: default_gpsd_addr(),
            fixed: default_fixed_position(),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid topic '{topic}': {reason}")]
    InvalidTopic { topic: String, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl LinkConfig {
    /// Load configuration from TOML file and validate it
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: LinkConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.broker.url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.broker.url.clone()))?;
        if !matches!(url.scheme(), "mqtt" | "mqtts" | "ws" | "wss") {
            return Err(ConfigError::InvalidBrokerUrl(format!(
                "{} (scheme must be mqtt, mqtts, ws or wss)",
                self.broker.url
            )));
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidBrokerUrl(self.broker.url.clone()));
        }

        for topic in [&self.topics.shared, &self.topics.prefix] {
            validate_topic_name(topic).map_err(|e| ConfigError::InvalidTopic {
                topic: topic.clone(),
                reason: e.to_string(),
            })?;
        }

        if self.reconnect.delay_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "reconnect.delay_ms must be greater than 0".to_string(),
            ));
        }

        if self.broker.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.connect_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn get_env_var_optional(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}
