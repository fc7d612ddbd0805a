//! Mock implementations for testing
//!
//! Provides a recording `Transport` and a scripted `PositionProvider` so
//! sessions can be exercised without a broker or a GPS daemon.

use crate::geo::{GeoError, GeoUpdate, PositionProvider};
use crate::protocol::Position;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

pub type PublishedMessage = (String, Vec<u8>);

/// Failure injected by [`MockTransport`]
#[derive(Debug, Error)]
#[error("mock transport failure: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport for testing
///
/// Clones share their recordings, so a test can keep one clone while the
/// session owns another.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    pub connect_attempts: Arc<Mutex<Vec<String>>>,
    pub subscriptions: Arc<Mutex<Vec<String>>>,
    pub published_messages: Arc<Mutex<Vec<PublishedMessage>>>,
    pub disconnects: Arc<Mutex<usize>>,
    pub should_fail: bool,
    pub fail_subscribe: bool,
    pub reject_publish: bool,
    auto_ack: Option<mpsc::Sender<TransportEvent>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connect call fails immediately
    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn failing_subscribe(mut self) -> Self {
        self.fail_subscribe = true;
        self
    }

    pub fn rejecting_publish(mut self) -> Self {
        self.reject_publish = true;
        self
    }

    /// Answer every connect with `ConnectSucceeded` on `events`
    pub fn with_auto_ack(mut self, events: mpsc::Sender<TransportEvent>) -> Self {
        self.auto_ack = Some(events);
        self
    }

    pub async fn connect_attempts(&self) -> Vec<String> {
        self.connect_attempts.lock().await.clone()
    }

    pub async fn last_client_id(&self) -> Option<String> {
        self.connect_attempts.lock().await.last().cloned()
    }

    pub async fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().await.clone()
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published_messages.lock().await.clone()
    }

    pub async fn disconnect_count(&self) -> usize {
        *self.disconnects.lock().await
    }

    pub async fn clear_history(&self) {
        self.connect_attempts.lock().await.clear();
        self.subscriptions.lock().await.clear();
        self.published_messages.lock().await.clear();
        *self.disconnects.lock().await = 0;
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Error = MockTransportError;

    async fn connect(&mut self, client_id: &str) -> Result<(), Self::Error> {
        self.connect_attempts
            .lock()
            .await
            .push(client_id.to_string());

        if self.should_fail {
            return Err(MockTransportError("connection refused".to_string()));
        }

        if let Some(events) = &self.auto_ack {
            let _ = events
                .send(TransportEvent::ConnectSucceeded {
                    client_id: client_id.to_string(),
                })
                .await;
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        if self.fail_subscribe {
            return Err(MockTransportError("subscribe rejected".to_string()));
        }
        self.subscriptions.lock().await.push(topic.to_string());
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        if self.reject_publish {
            return Err(MockTransportError(format!("publish to {topic} rejected")));
        }
        self.published_messages
            .lock()
            .await
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        *self.disconnects.lock().await += 1;
        Ok(())
    }
}

/// Position provider replaying a fixed script
///
/// Once the script is exhausted `next_fix` never completes, like a device
/// that stopped moving.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: VecDeque<GeoUpdate>,
    unavailable: bool,
}

impl ScriptedProvider {
    pub fn new(script: Vec<GeoUpdate>) -> Self {
        Self {
            script: script.into(),
            unavailable: false,
        }
    }

    /// A provider whose capability is missing
    pub fn unavailable() -> Self {
        Self {
            script: VecDeque::new(),
            unavailable: true,
        }
    }

    pub fn positions(positions: impl IntoIterator<Item = Position>) -> Self {
        Self::new(positions.into_iter().map(Ok).collect())
    }
}

#[async_trait]
impl PositionProvider for ScriptedProvider {
    async fn open(&mut self) -> Result<(), GeoError> {
        if self.unavailable {
            return Err(GeoError::CapabilityUnavailable(
                "no position provider".to_string(),
            ));
        }
        Ok(())
    }

    async fn next_fix(&mut self) -> Result<Position, GeoError> {
        match self.script.pop_front() {
            Some(update) => update,
            None => std::future::pending().await,
        }
    }
}
