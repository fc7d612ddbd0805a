//! Single dispatch loop for a running session
//!
//! Commands from the view, transport events, geolocation updates and the
//! retry timer all land on one `tokio::select!` loop that owns the
//! [`ConnectionManager`]. Nothing else touches the manager, so transitions
//! never interleave.

use super::manager::{ConnectionManager, PublishOutcome, SessionSnapshot};
use super::thermometer::Thermometer;
use crate::error::{LinkError, LinkResult};
use crate::geo::{GeoError, GeoUpdate, PositionWatch};
use crate::transport::{Transport, TransportEvent};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn, Instrument};

const COMMAND_BUFFER: usize = 32;

/// Requests from the view to the session
#[derive(Debug)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    /// Share a status report; `None` reads the session's thermometer
    ShareStatus {
        temperature: Option<i64>,
        reply: oneshot::Sender<PublishOutcome>,
    },
    SendMessage {
        topic: String,
        text: String,
        reply: oneshot::Sender<PublishOutcome>,
    },
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Cloneable handle for driving a running [`Session`]
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    async fn send(&self, command: SessionCommand) -> LinkResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| LinkError::SessionClosed)
    }

    pub async fn connect(&self) -> LinkResult<()> {
        self.send(SessionCommand::Connect).await
    }

    pub async fn disconnect(&self) -> LinkResult<()> {
        self.send(SessionCommand::Disconnect).await
    }

    pub async fn share_status(&self, temperature: Option<i64>) -> LinkResult<PublishOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::ShareStatus { temperature, reply })
            .await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    pub async fn send_message(
        &self,
        topic: impl Into<String>,
        text: impl Into<String>,
    ) -> LinkResult<PublishOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::SendMessage {
            topic: topic.into(),
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    pub async fn snapshot(&self) -> LinkResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(SessionCommand::Snapshot(reply)).await?;
        rx.await.map_err(|_| LinkError::SessionClosed)
    }

    /// Ask the session to disconnect and stop
    pub async fn shutdown(&self) -> LinkResult<()> {
        self.send(SessionCommand::Shutdown).await
    }
}

/// A session owning the connection manager and its inputs
pub struct Session<T: Transport> {
    manager: ConnectionManager<T>,
    transport_events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    geo_updates: Option<mpsc::Receiver<GeoUpdate>>,
    geo_watch: Option<PositionWatch>,
    thermometer: Box<dyn Thermometer>,
}

impl<T: Transport + 'static> Session<T> {
    pub fn new(
        manager: ConnectionManager<T>,
        transport_events: mpsc::Receiver<TransportEvent>,
        thermometer: Box<dyn Thermometer>,
    ) -> (Self, SessionHandle) {
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let session = Self {
            manager,
            transport_events,
            commands,
            geo_updates: None,
            geo_watch: None,
            thermometer,
        };
        (session, SessionHandle { commands: commands_tx })
    }

    /// Feed own positions from a running geolocation watch
    pub fn with_geo(mut self, watch: PositionWatch, updates: mpsc::Receiver<GeoUpdate>) -> Self {
        self.geo_watch = Some(watch);
        self.geo_updates = Some(updates);
        self
    }

    /// Run the session on its own task
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn next_geo(updates: &mut Option<mpsc::Receiver<GeoUpdate>>) -> Option<GeoUpdate> {
        match updates {
            Some(rx) => rx.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Dispatch until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let span = crate::session_span!(shared_topic = %self.manager.topics().shared_topic());

        async move {
            info!("Session started");

            loop {
                let retry = self.manager.pending_retry();
                let retry_due = retry.map(|r| r.due).unwrap_or_else(Instant::now);

                tokio::select! {
                    command = self.commands.recv() => match command {
                        Some(SessionCommand::Shutdown) | None => break,
                        Some(command) => self.handle_command(command).await,
                    },
                    Some(event) = self.transport_events.recv() => {
                        self.manager.handle_transport_event(event).await;
                    }
                    update = Self::next_geo(&mut self.geo_updates) => match update {
                        Some(update) => self.handle_geo(update),
                        None => {
                            debug!("Geolocation stream closed");
                            self.geo_updates = None;
                        }
                    },
                    _ = sleep_until(retry_due), if retry.is_some() => {
                        if let Some(retry) = retry {
                            info!(token = retry.token, "Retry delay elapsed");
                            self.manager.on_retry_elapsed(retry.token).await;
                        }
                    }
                }
            }

            self.manager.disconnect().await;
            if let Some(watch) = self.geo_watch.take() {
                watch.stop().await;
            }
            info!("Session stopped");
        }
        .instrument(span)
        .await
    }

    async fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => self.manager.connect().await,
            SessionCommand::Disconnect => self.manager.disconnect().await,
            SessionCommand::ShareStatus { temperature, reply } => {
                let temperature = temperature.unwrap_or_else(|| self.thermometer.read());
                let outcome = self.manager.share_status(temperature).await;
                let _ = reply.send(outcome);
            }
            SessionCommand::SendMessage { topic, text, reply } => {
                let outcome = self.manager.send_user_message(&topic, &text).await;
                let _ = reply.send(outcome);
            }
            SessionCommand::Snapshot(reply) => {
                let _ = reply.send(self.manager.snapshot());
            }
            // Handled by the loop
            SessionCommand::Shutdown => {}
        }
    }

    fn handle_geo(&mut self, update: GeoUpdate) {
        match update {
            Ok(position) => {
                debug!(
                    lat = position.latitude,
                    lng = position.longitude,
                    "Own position updated"
                );
                self.manager.update_position(position);
            }
            Err(GeoError::Transient(reason)) => {
                warn!("Position fix failed: {}", reason);
            }
            Err(GeoError::CapabilityUnavailable(reason)) => {
                error!("Geolocation unavailable: {}", reason);
            }
        }
    }
}
