//! Connection state machine for the pub/sub link
//!
//! `ConnectionManager` owns the transport and the session state. Every
//! transition happens through `&mut self`, so callers serialize them simply
//! by owning the manager on one task.
//!
//! The single retry after a connection loss is modelled as a [`PendingRetry`]
//! token that the owner arms with a timer and hands back through
//! [`ConnectionManager::on_retry_elapsed`]. Disconnecting clears the token,
//! so a late timer can never bring a closed session back.

use crate::protocol::{
    decode_status_report_bytes, DecodeError, DisplayCategory, OutgoingMessage, Position,
    StatusReport, TopicBuilder,
};
use crate::transport::{Transport, TransportEvent};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every generated client id
pub const CLIENT_ID_PREFIX: &str = "clientId-";

/// Lifecycle state of the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Events delivered to the presentation layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    ConnectFailed(String),
    ConnectionLost(String),
    Disconnected,
    ReportReceived(StatusReport),
    DecodeError(DecodeError),
}

/// Why a publish did not reach the transport
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropReason {
    #[error("not connected")]
    NotConnected,
    #[error("own position unknown")]
    NoPosition,
    #[error("transport rejected message: {0}")]
    TransportRejected(String),
}

/// Result of a publish request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    Dropped(DropReason),
}

impl PublishOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, PublishOutcome::Sent)
    }
}

/// The one scheduled reconnect attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRetry {
    pub token: u64,
    pub due: Instant,
}

/// Read-only view of the session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: ConnectionState,
    pub client_id: Option<String>,
    pub position: Option<Position>,
    pub last_report: Option<StatusReport>,
    pub category: Option<DisplayCategory>,
}

/// Generate a fresh client id, `clientId-` followed by 8 hex chars
pub fn generate_client_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{CLIENT_ID_PREFIX}{}", &id[..8])
}

/// Owns the transport and drives the link state machine
pub struct ConnectionManager<T: Transport> {
    transport: T,
    topics: TopicBuilder,
    retry_delay: Duration,
    state: ConnectionState,
    /// Client id of the attempt whose events are accepted
    client_id: Option<String>,
    position: Option<Position>,
    last_report: Option<StatusReport>,
    pending_retry: Option<PendingRetry>,
    next_token: u64,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: Transport> ConnectionManager<T> {
    /// Create a manager and the receiver for its presentation events
    pub fn new(
        transport: T,
        topics: TopicBuilder,
        retry_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            transport,
            topics,
            retry_delay,
            state: ConnectionState::Disconnected,
            client_id: None,
            position: None,
            last_report: None,
            pending_retry: None,
            next_token: 0,
            events_tx,
        };
        (manager, events_rx)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn last_report(&self) -> Option<&StatusReport> {
        self.last_report.as_ref()
    }

    pub fn pending_retry(&self) -> Option<PendingRetry> {
        self.pending_retry
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            client_id: self.client_id.clone(),
            position: self.position,
            last_report: self.last_report,
            category: self.last_report.map(|report| report.category()),
        }
    }

    fn emit(&self, event: SessionEvent) {
        if self.events_tx.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }

    fn is_current_attempt(&self, client_id: &str) -> bool {
        self.client_id.as_deref() == Some(client_id)
    }

    /// Start connecting; a no-op unless disconnected
    pub async fn connect(&mut self) {
        if self.state != ConnectionState::Disconnected {
            debug!(state = %self.state, "Connect ignored");
            return;
        }
        self.begin_attempt(ConnectionState::Connecting).await;
    }

    async fn begin_attempt(&mut self, state: ConnectionState) {
        let client_id = generate_client_id();
        self.state = state;
        self.client_id = Some(client_id.clone());

        info!(client_id = %client_id, state = %state, "Starting connection attempt");
        if let Err(e) = self.transport.connect(&client_id).await {
            self.fail_attempt(e.to_string());
        }
    }

    fn fail_attempt(&mut self, reason: String) {
        warn!(reason = %reason, "Connection attempt failed");
        self.state = ConnectionState::Disconnected;
        self.client_id = None;
        self.emit(SessionEvent::ConnectFailed(reason));
    }

    async fn on_connected(&mut self) {
        let shared = self.topics.shared_topic().to_string();
        if let Err(e) = self.transport.subscribe(&shared).await {
            if let Err(teardown) = self.transport.disconnect().await {
                debug!("Transport teardown after failed subscribe: {}", teardown);
            }
            self.fail_attempt(format!("subscribe to {shared} failed: {e}"));
            return;
        }

        info!(topic = %shared, "Connected and subscribed");
        self.state = ConnectionState::Connected;
        self.emit(SessionEvent::Connected);
    }

    fn on_connection_lost(&mut self, reason: String) {
        warn!(reason = %reason, delay_ms = self.retry_delay.as_millis() as u64, "Connection lost, scheduling retry");

        self.state = ConnectionState::Reconnecting;
        self.client_id = None;
        self.next_token += 1;
        self.pending_retry = Some(PendingRetry {
            token: self.next_token,
            due: Instant::now() + self.retry_delay,
        });
        self.emit(SessionEvent::ConnectionLost(reason));
    }

    /// Run the scheduled retry if `token` is still the armed one
    pub async fn on_retry_elapsed(&mut self, token: u64) {
        match self.pending_retry {
            Some(retry) if retry.token == token => {}
            _ => {
                debug!(token, "Stale retry token ignored");
                return;
            }
        }
        self.pending_retry = None;

        if self.state != ConnectionState::Reconnecting {
            debug!(state = %self.state, "Retry fired outside Reconnecting");
            return;
        }
        self.begin_attempt(ConnectionState::Reconnecting).await;
    }

    /// Fold a transport event into the state machine
    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::ConnectSucceeded { client_id } => {
                let attempting = matches!(
                    self.state,
                    ConnectionState::Connecting | ConnectionState::Reconnecting
                );
                if attempting && self.is_current_attempt(&client_id) {
                    self.on_connected().await;
                } else {
                    debug!(client_id = %client_id, "Ignoring success of abandoned attempt");
                }
            }
            TransportEvent::ConnectFailed { client_id, reason } => {
                if self.is_current_attempt(&client_id) && self.state != ConnectionState::Connected {
                    self.fail_attempt(reason);
                } else {
                    debug!(client_id = %client_id, "Ignoring failure of abandoned attempt");
                }
            }
            TransportEvent::ConnectionLost { client_id, reason } => {
                if self.is_current_attempt(&client_id) && self.state == ConnectionState::Connected {
                    self.on_connection_lost(reason);
                } else {
                    debug!(client_id = %client_id, "Ignoring loss of stale connection");
                }
            }
            TransportEvent::MessageArrived { topic, payload } => {
                debug!(topic = %topic, bytes = payload.len(), "Message arrived");
                self.on_message(&payload);
            }
        }
    }

    /// Tear down the link; idempotent when already disconnected
    pub async fn disconnect(&mut self) {
        if self.state == ConnectionState::Disconnected {
            debug!("Disconnect ignored, already disconnected");
            return;
        }

        self.pending_retry = None;
        self.client_id = None;
        if let Err(e) = self.transport.disconnect().await {
            warn!("Transport teardown failed: {}", e);
        }

        info!("Disconnected");
        self.state = ConnectionState::Disconnected;
        self.emit(SessionEvent::Disconnected);
    }

    /// Record the latest own position
    pub fn update_position(&mut self, position: Position) {
        self.position = Some(position);
    }

    fn publish_precondition(&self) -> Option<DropReason> {
        if self.state != ConnectionState::Connected {
            Some(DropReason::NotConnected)
        } else if self.position.is_none() {
            Some(DropReason::NoPosition)
        } else {
            None
        }
    }

    fn dropped(topic: &str, reason: DropReason) -> PublishOutcome {
        warn!(topic = %topic, reason = %reason, "Publish dropped");
        PublishOutcome::Dropped(reason)
    }

    /// Publish a message if connected and the own position is known
    ///
    /// Messages that cannot be sent are dropped, never queued.
    pub async fn publish(&mut self, message: OutgoingMessage) -> PublishOutcome {
        if let Some(reason) = self.publish_precondition() {
            return Self::dropped(&message.destination_topic, reason);
        }

        let OutgoingMessage {
            destination_topic,
            payload,
        } = message;
        match self
            .transport
            .publish(&destination_topic, payload.into_bytes())
            .await
        {
            Ok(()) => {
                debug!(topic = %destination_topic, "Published");
                PublishOutcome::Sent
            }
            Err(e) => Self::dropped(&destination_topic, DropReason::TransportRejected(e.to_string())),
        }
    }

    /// Publish a status report built from the own position
    pub async fn share_status(&mut self, temperature: i64) -> PublishOutcome {
        let shared = self.topics.shared_topic().to_string();
        if let Some(reason) = self.publish_precondition() {
            return Self::dropped(&shared, reason);
        }
        let Some(position) = self.position else {
            return Self::dropped(&shared, DropReason::NoPosition);
        };

        let message = OutgoingMessage::status_report(&self.topics, position, temperature);
        self.publish(message).await
    }

    /// Publish free text to `<prefix>/<segment>`
    pub async fn send_user_message(&mut self, segment: &str, text: &str) -> PublishOutcome {
        let message = OutgoingMessage::user_message(&self.topics, segment, text);
        self.publish(message).await
    }

    /// Decode an inbound payload as a peer status report
    pub fn on_message(&mut self, payload: &[u8]) {
        match decode_status_report_bytes(payload) {
            Ok(report) => {
                info!(
                    temperature = report.temperature,
                    category = %report.category(),
                    "Status report received"
                );
                self.last_report = Some(report);
                self.emit(SessionEvent::ReportReceived(report));
            }
            Err(e) => {
                warn!("Discarding malformed payload: {}", e);
                self.emit(SessionEvent::DecodeError(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_status_report;
    use crate::testing::MockTransport;

    fn manager(
        transport: MockTransport,
    ) -> (
        ConnectionManager<MockTransport>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        ConnectionManager::new(transport, TopicBuilder::default(), Duration::from_millis(3000))
    }

    async fn connected(
        transport: &MockTransport,
    ) -> (
        ConnectionManager<MockTransport>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (mut manager, mut events) = manager(transport.clone());
        manager.connect().await;
        let client_id = transport.last_client_id().await.unwrap();
        manager
            .handle_transport_event(TransportEvent::ConnectSucceeded { client_id })
            .await;
        assert_eq!(events.recv().await, Some(SessionEvent::Connected));
        (manager, events)
    }

    #[test]
    fn test_generate_client_id_shape() {
        let id = generate_client_id();
        assert!(id.starts_with(CLIENT_ID_PREFIX));
        let suffix = &id[CLIENT_ID_PREFIX.len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_client_id(), generate_client_id());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Reconnecting.to_string(), "reconnecting");
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }

    #[tokio::test]
    async fn test_connect_moves_to_connecting() {
        let transport = MockTransport::new();
        let (mut manager, _events) = manager(transport.clone());

        manager.connect().await;

        assert_eq!(manager.state(), ConnectionState::Connecting);
        assert_eq!(transport.connect_attempts().await.len(), 1);
        assert!(transport.subscriptions().await.is_empty());
    }

    #[tokio::test]
    async fn test_immediate_transport_failure_reports_connect_failed() {
        let transport = MockTransport::with_failure();
        let (mut manager, mut events) = manager(transport);

        manager.connect().await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(events.recv().await, Some(SessionEvent::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_connect_failure() {
        let transport = MockTransport::new().failing_subscribe();
        let (mut manager, mut events) = manager(transport.clone());

        manager.connect().await;
        let client_id = transport.last_client_id().await.unwrap();
        manager
            .handle_transport_event(TransportEvent::ConnectSucceeded { client_id })
            .await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(matches!(events.recv().await, Some(SessionEvent::ConnectFailed(_))));
    }

    #[tokio::test]
    async fn test_loss_arms_single_retry() {
        let transport = MockTransport::new();
        let (mut manager, mut events) = connected(&transport).await;
        let client_id = transport.last_client_id().await.unwrap();

        let before = Instant::now();
        manager
            .handle_transport_event(TransportEvent::ConnectionLost {
                client_id,
                reason: "socket closed".to_string(),
            })
            .await;

        assert_eq!(manager.state(), ConnectionState::Reconnecting);
        assert_eq!(
            events.recv().await,
            Some(SessionEvent::ConnectionLost("socket closed".to_string()))
        );
        let retry = manager.pending_retry().unwrap();
        assert!(retry.due >= before + Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_stale_retry_token_ignored() {
        let transport = MockTransport::new();
        let (mut manager, _events) = connected(&transport).await;
        let client_id = transport.last_client_id().await.unwrap();
        manager
            .handle_transport_event(TransportEvent::ConnectionLost {
                client_id,
                reason: "gone".to_string(),
            })
            .await;
        let retry = manager.pending_retry().unwrap();

        manager.on_retry_elapsed(retry.token + 1).await;

        assert_eq!(transport.connect_attempts().await.len(), 1);
        assert_eq!(manager.pending_retry(), Some(retry));
    }

    #[tokio::test]
    async fn test_message_updates_last_report() {
        let (mut manager, mut events) = manager(MockTransport::new());
        let payload = encode_status_report(Position::new(10.0, 20.0), 31);

        manager.on_message(payload.as_bytes());

        let report = StatusReport::new(Position::new(10.0, 20.0), 31);
        assert_eq!(events.recv().await, Some(SessionEvent::ReportReceived(report)));
        assert_eq!(manager.snapshot().category, Some(DisplayCategory::High));
    }

    #[tokio::test]
    async fn test_share_status_without_position_dropped() {
        let transport = MockTransport::new();
        let (mut manager, _events) = connected(&transport).await;

        let outcome = manager.share_status(12).await;

        assert_eq!(outcome, PublishOutcome::Dropped(DropReason::NoPosition));
        assert!(transport.published().await.is_empty());
    }

    #[tokio::test]
    async fn test_transport_rejection_reported_as_drop() {
        let transport = MockTransport::new().rejecting_publish();
        let (mut manager, _events) = connected(&transport).await;
        manager.update_position(Position::new(1.0, 2.0));

        let outcome = manager.send_user_message("bob", "hello").await;

        assert!(matches!(
            outcome,
            PublishOutcome::Dropped(DropReason::TransportRejected(_))
        ));
    }
}
