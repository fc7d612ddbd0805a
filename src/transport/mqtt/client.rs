//! Impure I/O operations for the MQTT transport
//!
//! Each `connect` builds a fresh rumqttc client and event loop and spawns a
//! task that polls it. The task reports the attempt's outcome, forwards
//! inbound publishes, and stops at the first connection error so the session
//! stays in charge of reconnecting.

use super::connection::{configure_mqtt_options, BrokerEndpoint, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::BrokerSection;
use crate::transport::{Transport, TransportEvent};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

const EVENT_BUFFER: usize = 64;
const REQUEST_CAPACITY: usize = 10;
const GRACEFUL_SHUTDOWN: Duration = Duration::from_secs(2);
const DISCONNECT_FLUSH: Duration = Duration::from_secs(1);

struct ActiveConnection {
    client_id: String,
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// MQTT transport client
pub struct MqttClient {
    config: BrokerSection,
    events_tx: mpsc::Sender<TransportEvent>,
    active: Option<ActiveConnection>,
}

impl MqttClient {
    /// Create a transport and the channel its events arrive on
    pub fn new(config: BrokerSection) -> Result<(Self, mpsc::Receiver<TransportEvent>), MqttError> {
        BrokerEndpoint::parse(&config.url)?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        Ok((
            MqttClient {
                config,
                events_tx,
                active: None,
            },
            events_rx,
        ))
    }

    /// Client id of the current connection, if any
    pub fn client_id(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.client_id.as_str())
    }

    /// Whether the event loop task of the current connection is still running
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|a| !a.handle.is_finished())
    }

    async fn emit(events_tx: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
        if events_tx.send(event).await.is_err() {
            debug!(target: "mqtt_transport", "Transport event receiver dropped");
        }
    }

    /// Returns true when shutdown was requested or the handle went away
    fn shutdown_requested(changed: Result<(), watch::error::RecvError>, rx: &watch::Receiver<bool>) -> bool {
        changed.is_err() || *rx.borrow()
    }

    /// Poll until the broker answers the connect, the attempt fails, or it times out
    ///
    /// Returns true once connected.
    async fn await_connack(
        client_id: &str,
        event_loop: &mut EventLoop,
        events_tx: &mpsc::Sender<TransportEvent>,
        shutdown_rx: &mut watch::Receiver<bool>,
        timeout: Duration,
    ) -> bool {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if Self::shutdown_requested(changed, shutdown_rx) {
                        debug!(target: "mqtt_transport", "Connect attempt {} abandoned", client_id);
                        return false;
                    }
                }
                _ = &mut deadline => {
                    let reason = "ConnAck timeout - no connection confirmation received".to_string();
                    Self::emit(events_tx, TransportEvent::ConnectFailed {
                        client_id: client_id.to_string(),
                        reason,
                    }).await;
                    return false;
                }
                event = event_loop.poll() => match event {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::ConnectionAcknowledged => {
                            Self::emit(events_tx, TransportEvent::ConnectSucceeded {
                                client_id: client_id.to_string(),
                            }).await;
                            return true;
                        }
                        EventRoute::ConnectionRefused(code) => {
                            Self::emit(events_tx, TransportEvent::ConnectFailed {
                                client_id: client_id.to_string(),
                                reason: format!("Broker refused connection: {code}"),
                            }).await;
                            return false;
                        }
                        _ => continue,
                    },
                    Err(e) => {
                        Self::emit(events_tx, TransportEvent::ConnectFailed {
                            client_id: client_id.to_string(),
                            reason: e.to_string(),
                        }).await;
                        return false;
                    }
                }
            }
        }
    }

    /// Let a queued Disconnect request reach the broker
    async fn flush_disconnect(event_loop: &mut EventLoop) {
        let flushed = tokio::time::timeout(DISCONNECT_FLUSH, async {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
        })
        .await;

        if flushed.is_err() {
            debug!(target: "mqtt_transport", "Disconnect not flushed before timeout");
        }
    }

    /// Event loop task for one connection
    async fn run_event_loop(
        client_id: String,
        mut event_loop: EventLoop,
        events_tx: mpsc::Sender<TransportEvent>,
        mut shutdown_rx: watch::Receiver<bool>,
        connect_timeout: Duration,
    ) {
        if !Self::await_connack(
            &client_id,
            &mut event_loop,
            &events_tx,
            &mut shutdown_rx,
            connect_timeout,
        )
        .await
        {
            return;
        }

        info!("MQTT connection {} established", client_id);

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if Self::shutdown_requested(changed, &shutdown_rx) {
                        Self::flush_disconnect(&mut event_loop).await;
                        break;
                    }
                }
                event = event_loop.poll() => match event {
                    Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                        EventRoute::MessageReceived { topic, payload } => {
                            debug!(target: "mqtt_transport", "Received MQTT message on topic: {}", topic);
                            Self::emit(&events_tx, TransportEvent::MessageArrived { topic, payload }).await;
                        }
                        EventRoute::Disconnected => {
                            warn!("Broker disconnected {}", client_id);
                            Self::emit(&events_tx, TransportEvent::ConnectionLost {
                                client_id: client_id.clone(),
                                reason: "Broker disconnected".to_string(),
                            }).await;
                            break;
                        }
                        EventRoute::LocalDisconnect => break,
                        EventRoute::SubscriptionConfirmed { packet_id } => {
                            debug!(target: "mqtt_transport", "Subscription confirmed: {}", packet_id);
                        }
                        EventRoute::InfrastructureEvent(event_str) => {
                            debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                        }
                        EventRoute::ConnectionAcknowledged | EventRoute::ConnectionRefused(_) => {
                            debug!(target: "mqtt_transport", "Unexpected ConnAck on established connection");
                        }
                        EventRoute::OutgoingEvent => {}
                    },
                    Err(e) => {
                        error!("MQTT event loop error for {}: {}", client_id, e);
                        Self::emit(&events_tx, TransportEvent::ConnectionLost {
                            client_id: client_id.clone(),
                            reason: e.to_string(),
                        }).await;
                        break;
                    }
                }
            }
        }

        info!("MQTT event loop stopped for {}", client_id);
    }

    /// Stop the current connection, if any
    async fn teardown(&mut self) -> Result<(), MqttError> {
        let Some(active) = self.active.take() else {
            return Ok(());
        };
        let ActiveConnection {
            client_id,
            client,
            shutdown_tx,
            mut handle,
        } = active;

        let mut result = Ok(());
        if !handle.is_finished() {
            result = client
                .disconnect()
                .await
                .map_err(MqttError::DisconnectFailed);
        }
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(GRACEFUL_SHUTDOWN, &mut handle).await {
            Ok(Ok(())) => debug!(target: "mqtt_transport", "Event loop for {} shut down gracefully", client_id),
            Ok(Err(e)) if !e.is_cancelled() => warn!("Event loop task ended with error: {}", e),
            Ok(Err(_)) => {}
            Err(_) => {
                warn!("Event loop for {} didn't shut down gracefully, forcing abort", client_id);
                handle.abort();
            }
        }

        result
    }

    fn current(&self) -> Result<&ActiveConnection, MqttError> {
        self.active.as_ref().ok_or(MqttError::NotConnected)
    }
}

#[async_trait]
impl Transport for MqttClient {
    type Error = MqttError;

    async fn connect(&mut self, client_id: &str) -> Result<(), Self::Error> {
        if let Err(e) = self.teardown().await {
            debug!(target: "mqtt_transport", "Previous connection teardown: {}", e);
        }

        let options = configure_mqtt_options(client_id, &self.config)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(client_id = %client_id, broker = %self.config.url, "Connecting to MQTT broker");

        let handle = tokio::spawn(
            Self::run_event_loop(
                client_id.to_string(),
                event_loop,
                self.events_tx.clone(),
                shutdown_rx,
                self.config.connect_timeout(),
            )
            .instrument(crate::mqtt_span!(client_id = %client_id)),
        );

        self.active = Some(ActiveConnection {
            client_id: client_id.to_string(),
            client,
            shutdown_tx,
            handle,
        });
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), Self::Error> {
        let active = self.current()?;
        active
            .client
            .subscribe(topic, MessageHandler::link_qos())
            .await
            .map_err(MqttError::SubscriptionFailed)?;

        info!("Subscribed to: {}", topic);
        Ok(())
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), Self::Error> {
        let active = self.current()?;
        active
            .client
            .publish(topic, MessageHandler::link_qos(), false, payload)
            .await
            .map_err(MqttError::PublishFailed)?;

        debug!(target: "mqtt_transport", "Published to {}", topic);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), Self::Error> {
        self.teardown().await?;
        info!("MQTT client disconnected");
        Ok(())
    }
}

impl Drop for MqttClient {
    fn drop(&mut self) {
        // No async in Drop; call disconnect() for a graceful close
        if let Some(active) = self.active.take() {
            let _ = active.shutdown_tx.send(true);
            active.handle.abort();
        }
    }
}
