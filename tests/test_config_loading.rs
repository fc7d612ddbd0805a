//! Configuration loading and validation tests
//!
//! Tests focus on observable outcomes of loading a `geotemp.toml`: defaults,
//! overrides and the errors surfaced for invalid files.

use geotemp_link::config::{ConfigError, GeoProviderKind, LinkConfig};
use geotemp_link::protocol::Position;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(contents: &str) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{contents}").unwrap();
    temp_file
}

#[test]
fn test_empty_file_yields_defaults() {
    let temp_file = write_config("");

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config, LinkConfig::default());
    assert_eq!(config.broker.url, "wss://test.mosquitto.org:8081/mqtt");
    assert_eq!(config.topics.shared, "ENG551/Ashraful/my_temperature");
    assert_eq!(config.topics.prefix, "ENG551/Ashraful");
    assert_eq!(config.reconnect.delay(), Duration::from_millis(3000));
    assert_eq!(config.geo.provider, GeoProviderKind::Gpsd);
}

#[test]
fn test_config_loads_all_sections() {
    // Arrange
    let temp_file = write_config(
        r#"
[broker]
url = "mqtt://localhost:1883"
keep_alive_secs = 20
connect_timeout_secs = 5

[topics]
shared = "lab/readings"
prefix = "lab"

[reconnect]
delay_ms = 1500

[geo]
provider = "fixed"
fixed = { lat = 45.5, lng = -73.6 }
"#,
    );

    // Act
    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();

    // Assert
    assert_eq!(config.broker.url, "mqtt://localhost:1883");
    assert_eq!(config.broker.keep_alive_secs, 20);
    assert_eq!(config.broker.connect_timeout(), Duration::from_secs(5));
    assert_eq!(config.reconnect.delay(), Duration::from_millis(1500));
    assert_eq!(config.geo.provider, GeoProviderKind::Fixed);
    assert_eq!(config.geo.fixed, Position::new(45.5, -73.6));

    let topics = config.topics.builder();
    assert_eq!(topics.shared_topic(), "lab/readings");
    assert_eq!(topics.user_topic("alice"), "lab/alice");
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let temp_file = write_config(
        r#"
[broker]
url = "ws://broker.local:9001/mqtt"
"#,
    );

    let config = LinkConfig::load_from_file(temp_file.path()).unwrap();

    assert_eq!(config.broker.url, "ws://broker.local:9001/mqtt");
    assert_eq!(config.broker.keep_alive_secs, 60);
    assert_eq!(config.topics, LinkConfig::default().topics);
}

#[test]
fn test_missing_file_is_read_error() {
    let result = LinkConfig::load_from_file(std::path::Path::new("/nonexistent/geotemp.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead(_))));
}

#[test]
fn test_malformed_toml_is_parse_error() {
    let temp_file = write_config("[broker\nurl = ");

    let result = LinkConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_unknown_provider_is_parse_error() {
    let temp_file = write_config(
        r#"
[geo]
provider = "satellite"
"#,
    );

    let result = LinkConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::TomlParse(_))));
}

#[test]
fn test_http_broker_rejected() {
    let temp_file = write_config(
        r#"
[broker]
url = "http://localhost:1883"
"#,
    );

    let result = LinkConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidBrokerUrl(_))));
}

#[test]
fn test_wildcard_prefix_rejected() {
    let temp_file = write_config(
        r#"
[topics]
prefix = "lab/#"
"#,
    );

    let result = LinkConfig::load_from_file(temp_file.path());

    assert!(matches!(
        result,
        Err(ConfigError::InvalidTopic { topic, .. }) if topic == "lab/#"
    ));
}

#[test]
fn test_zero_connect_timeout_rejected() {
    let temp_file = write_config(
        r#"
[broker]
connect_timeout_secs = 0
"#,
    );

    let result = LinkConfig::load_from_file(temp_file.path());

    assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
}

#[test]
fn test_config_serializes_back_to_toml() {
    let config = LinkConfig::default();

    let text = toml::to_string_pretty(&config).unwrap();
    let reparsed: LinkConfig = toml::from_str(&text).unwrap();

    assert_eq!(reparsed, config);
}
