//! gpsd position provider
//!
//! Speaks the gpsd JSON protocol over TCP: enables watch mode and turns
//! `TPV` reports that carry a 2D or 3D fix into positions. Other report
//! classes (`VERSION`, `DEVICES`, `WATCH`, `SKY`, ...) are skipped.

use super::{GeoError, PositionProvider};
use crate::protocol::Position;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tracing::{debug, info};

const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// Minimal view of a gpsd report line
#[derive(Debug, Deserialize)]
struct GpsdReport {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Reads fixes from a gpsd daemon
pub struct GpsdProvider {
    addr: String,
    reconnect_delay: Duration,
    lines: Option<Lines<BufReader<TcpStream>>>,
}

impl GpsdProvider {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reconnect_delay: Duration::from_secs(1),
            lines: None,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    async fn open_stream(&self) -> std::io::Result<Lines<BufReader<TcpStream>>> {
        let mut stream = TcpStream::connect(&self.addr).await?;
        stream.write_all(WATCH_COMMAND).await?;
        Ok(BufReader::new(stream).lines())
    }
}

/// Parse one gpsd line; `Ok(None)` for reports that carry no position
pub fn parse_report_line(line: &str) -> Result<Option<Position>, GeoError> {
    let report: GpsdReport = serde_json::from_str(line)
        .map_err(|e| GeoError::Transient(format!("unparsable gpsd report: {e}")))?;

    if report.class != "TPV" {
        return Ok(None);
    }

    match (report.mode, report.lat, report.lon) {
        (mode, Some(lat), Some(lon)) if mode >= 2 => Ok(Some(Position::new(lat, lon))),
        _ => Err(GeoError::Transient("no position fix".to_string())),
    }
}

#[async_trait]
impl PositionProvider for GpsdProvider {
    async fn open(&mut self) -> Result<(), GeoError> {
        let lines = self.open_stream().await.map_err(|e| {
            GeoError::CapabilityUnavailable(format!("gpsd at {}: {e}", self.addr))
        })?;
        info!("Connected to gpsd at {}", self.addr);
        self.lines = Some(lines);
        Ok(())
    }

    async fn next_fix(&mut self) -> Result<Position, GeoError> {
        loop {
            if self.lines.is_none() {
                tokio::time::sleep(self.reconnect_delay).await;
                let lines = self
                    .open_stream()
                    .await
                    .map_err(|e| GeoError::Transient(format!("gpsd reconnect failed: {e}")))?;
                debug!("Reconnected to gpsd at {}", self.addr);
                self.lines = Some(lines);
            }
            let Some(lines) = self.lines.as_mut() else {
                continue;
            };

            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(position) = parse_report_line(&line)? {
                        return Ok(position);
                    }
                }
                Ok(None) => {
                    self.lines = None;
                    return Err(GeoError::Transient(
                        "gpsd closed the connection".to_string(),
                    ));
                }
                Err(e) => {
                    self.lines = None;
                    return Err(GeoError::Transient(format!("gpsd read failed: {e}")));
                }
            }
        }
    }
}
