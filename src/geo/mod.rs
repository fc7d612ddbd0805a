//! Continuous position acquisition
//!
//! [`GeoSource::start`] turns a [`PositionProvider`] into a lazy, infinite
//! stream of [`GeoUpdate`]s. The stream is not restartable: starting consumes
//! the provider and stopping consumes the [`PositionWatch`].
//!
//! Failures are reported on the stream, never fatal to the caller:
//! - [`GeoError::CapabilityUnavailable`] is delivered once and ends acquisition
//! - [`GeoError::Transient`] is delivered and acquisition continues

pub mod fixed;
pub mod gpsd;

pub use fixed::FixedProvider;
pub use gpsd::GpsdProvider;

use crate::protocol::Position;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Geolocation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    #[error("Geolocation is not supported on this host: {0}")]
    CapabilityUnavailable(String),
    #[error("Position fix failed: {0}")]
    Transient(String),
}

/// One item of the position stream
pub type GeoUpdate = Result<Position, GeoError>;

/// Source of raw position fixes
#[async_trait]
pub trait PositionProvider: Send + 'static {
    /// Prepare acquisition; an error here means the capability is unavailable
    async fn open(&mut self) -> Result<(), GeoError>;

    /// Wait for the next fix
    async fn next_fix(&mut self) -> Result<Position, GeoError>;
}

const UPDATE_BUFFER: usize = 32;

/// Starts position watching
pub struct GeoSource;

impl GeoSource {
    /// Start watching positions from `provider`
    pub fn start<P: PositionProvider>(provider: P) -> (PositionWatch, mpsc::Receiver<GeoUpdate>) {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(run_watch(provider, updates_tx, shutdown_rx));

        (
            PositionWatch {
                shutdown_tx,
                handle: Some(handle),
            },
            updates_rx,
        )
    }
}

async fn run_watch<P: PositionProvider>(
    mut provider: P,
    updates_tx: mpsc::Sender<GeoUpdate>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    if let Err(e) = provider.open().await {
        warn!("Position acquisition unavailable: {}", e);
        let _ = updates_tx.send(Err(into_capability_error(e))).await;
        return;
    }

    info!("Position watch started");
    let mut last: Option<Position> = None;

    loop {
        let fix = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
                continue;
            }
            fix = provider.next_fix() => fix,
        };

        let update = match fix {
            Ok(position) if last == Some(position) => continue,
            Ok(position) => {
                last = Some(position);
                Ok(position)
            }
            Err(GeoError::Transient(reason)) => {
                debug!("Transient position failure: {}", reason);
                Err(GeoError::Transient(reason))
            }
            Err(e @ GeoError::CapabilityUnavailable(_)) => {
                let _ = updates_tx.send(Err(e)).await;
                break;
            }
        };

        if updates_tx.send(update).await.is_err() {
            debug!("Position receiver dropped, stopping watch");
            break;
        }
    }

    info!("Position watch stopped");
}

fn into_capability_error(error: GeoError) -> GeoError {
    match error {
        GeoError::Transient(reason) => GeoError::CapabilityUnavailable(reason),
        unavailable => unavailable,
    }
}

/// Handle to a running position watch
///
/// Dropping the handle also stops acquisition.
pub struct PositionWatch {
    shutdown_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PositionWatch {
    /// Stop acquisition and wait for the watch task to finish
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(handle) = self.handle.take() {
            if tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .is_err()
            {
                warn!("Position watch did not stop in time");
            }
        }
    }

    /// Whether the watch task is still running
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
