//! Topic naming for status reports and user messages
//!
//! Status reports always go to one shared topic. User messages go to
//! `<prefix>/<segment>` where the segment is taken verbatim from user input;
//! only the broker's own topic rules apply to it.

use thiserror::Error;

/// Shared topic the original deployment reports on
pub const DEFAULT_SHARED_TOPIC: &str = "ENG551/Ashraful/my_temperature";
/// Namespace user-addressed messages are scoped under
pub const DEFAULT_TOPIC_PREFIX: &str = "ENG551/Ashraful";

/// Builds destination topics for outgoing messages
#[derive(Debug, Clone, PartialEq)]
pub struct TopicBuilder {
    shared: String,
    prefix: String,
}

impl TopicBuilder {
    pub fn new(shared: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            shared: shared.into(),
            prefix: prefix.into(),
        }
    }

    /// Topic status reports are published and subscribed on
    pub fn shared_topic(&self) -> &str {
        &self.shared
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build `<prefix>/<segment>`
    pub fn user_topic(&self, segment: &str) -> String {
        format!("{}/{}", self.prefix, segment)
    }
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_SHARED_TOPIC, DEFAULT_TOPIC_PREFIX)
    }
}

/// Topic validation errors
#[derive(Debug, Error, PartialEq)]
pub enum TopicError {
    #[error("Topic cannot be empty")]
    Empty,
    #[error("Topic contains wildcard character: '{0}'")]
    Wildcard(char),
    #[error("Topic contains a null character")]
    NullChar,
}

/// Check a configured topic name against MQTT publish rules
pub fn validate_topic_name(topic: &str) -> Result<(), TopicError> {
    if topic.is_empty() {
        return Err(TopicError::Empty);
    }

    for ch in topic.chars() {
        match ch {
            '+' | '#' => return Err(TopicError::Wildcard(ch)),
            '\0' => return Err(TopicError::NullChar),
            _ => {}
        }
    }

    Ok(())
}
