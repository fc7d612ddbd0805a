//! Terminal session view
//!
//! Parses the interactive command lines typed by the user and renders
//! session events and snapshots as plain text. No I/O happens here; the
//! binary owns stdin and stdout.

use crate::session::{PublishOutcome, SessionEvent, SessionSnapshot};
use thiserror::Error;

pub const HELP: &str = "\
Commands:
  connect               connect to the broker
  disconnect            close the connection
  share [temp]          share position and temperature (simulated if omitted)
  send <topic> <text>   send text to <prefix>/<topic>
  status                show connection state and the last report
  help                  show this help
  quit                  disconnect and exit";

/// A command typed into the session view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    Connect,
    Disconnect,
    Share(Option<i64>),
    Send { topic: String, text: String },
    Status,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command `{0}`, type `help` for a list")]
    UnknownCommand(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("`{0}` is not a whole number")]
    InvalidTemperature(String),
}

/// Parse one input line; blank lines yield `None`
pub fn parse_command(line: &str) -> Result<Option<ViewCommand>, ParseError> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word.to_lowercase().as_str() {
        "" => return Ok(None),
        "connect" => ViewCommand::Connect,
        "disconnect" => ViewCommand::Disconnect,
        "share" if rest.is_empty() => ViewCommand::Share(None),
        "share" => {
            let temperature = rest
                .parse()
                .map_err(|_| ParseError::InvalidTemperature(rest.to_string()))?;
            ViewCommand::Share(Some(temperature))
        }
        "send" => {
            let (topic, text) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::MissingArgument("message text"))?;
            if topic.is_empty() {
                return Err(ParseError::MissingArgument("topic"));
            }
            ViewCommand::Send {
                topic: topic.to_string(),
                text: text.trim().to_string(),
            }
        }
        "status" => ViewCommand::Status,
        "help" | "?" => ViewCommand::Help,
        "quit" | "exit" => ViewCommand::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

/// One line describing a session event
pub fn render_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected => "Connected to broker".to_string(),
        SessionEvent::ConnectFailed(reason) => format!("Connection failed: {reason}"),
        SessionEvent::ConnectionLost(reason) => {
            format!("Connection lost: {reason}. Reconnecting...")
        }
        SessionEvent::Disconnected => "Disconnected".to_string(),
        SessionEvent::ReportReceived(report) => format!(
            "Report at ({:.5}, {:.5}): {} degrees [{}]",
            report.position.latitude,
            report.position.longitude,
            report.temperature,
            report.category()
        ),
        SessionEvent::DecodeError(error) => format!("Ignored malformed report: {error}"),
    }
}

pub fn render_outcome(outcome: &PublishOutcome) -> String {
    match outcome {
        PublishOutcome::Sent => "Sent".to_string(),
        PublishOutcome::Dropped(reason) => format!("Not sent: {reason}"),
    }
}

/// Multi-line status block
pub fn render_snapshot(snapshot: &SessionSnapshot) -> String {
    let position = match snapshot.position {
        Some(p) => format!("{:.5}, {:.5}", p.latitude, p.longitude),
        None => "unknown".to_string(),
    };
    let temperature = match (snapshot.last_report, snapshot.category) {
        (Some(report), Some(category)) => format!("{} ({category})", report.temperature),
        _ => "N/A".to_string(),
    };

    let mut lines = vec![format!("State: {}", snapshot.state)];
    if let Some(client_id) = &snapshot.client_id {
        lines.push(format!("Client: {client_id}"));
    }
    lines.push(format!("Position: {position}"));
    lines.push(format!("Temperature: {temperature}"));
    lines.join("\n")
}
