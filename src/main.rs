//! geotemp - interactive position and temperature sharing over MQTT

use chrono::Local;
use clap::{Parser, Subcommand};
use geotemp_link::config::{GeoProviderKind, GeoSection, LinkConfig};
use geotemp_link::geo::{FixedProvider, GeoSource, GeoUpdate, GpsdProvider, PositionWatch};
use geotemp_link::observability::init_default_logging;
use geotemp_link::session::{ConnectionManager, Session, SessionHandle, SimulatedThermometer};
use geotemp_link::transport::mqtt::MqttClient;
use geotemp_link::view::{
    parse_command, render_event, render_outcome, render_snapshot, ViewCommand, HELP,
};
use geotemp_link::LinkError;
use std::path::PathBuf;
use std::process;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["geotemp.toml", "config/geotemp.toml"];

/// Share position and temperature readings over MQTT
#[derive(Parser)]
#[command(name = "geotemp")]
#[command(about = "Share position and temperature readings over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "GEOTEMP_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Run {
        /// Connect to the broker right away
        #[arg(long)]
        connect: bool,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging(cli.verbose);

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { connect } => run_session(config, connect).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<LinkConfig, LinkError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(LinkConfig::load_from_file(path)?);
    }

    for path_str in DEFAULT_CONFIG_PATHS {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(LinkConfig::load_from_file(&path)?);
        }
    }

    info!("No configuration file found, using defaults");
    let config = LinkConfig::default();
    config.validate()?;
    Ok(config)
}

fn handle_config_command(config: &LinkConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    println!("Configuration is valid");
    Ok(())
}

fn start_geo(geo: &GeoSection) -> (PositionWatch, mpsc::Receiver<GeoUpdate>) {
    match geo.provider {
        GeoProviderKind::Gpsd => {
            info!("Watching position from gpsd at {}", geo.gpsd_addr);
            GeoSource::start(GpsdProvider::new(geo.gpsd_addr.clone()))
        }
        GeoProviderKind::Fixed => {
            info!(
                "Using fixed position {}, {}",
                geo.fixed.latitude, geo.fixed.longitude
            );
            GeoSource::start(FixedProvider::new(geo.fixed))
        }
    }
}

fn print_line(text: &str) {
    for line in text.lines() {
        println!("[{}] {}", Local::now().format("%H:%M:%S"), line);
    }
}

/// Forward one command to the session; returns false on quit
async fn dispatch(handle: &SessionHandle, command: ViewCommand) -> Result<bool, LinkError> {
    match command {
        ViewCommand::Connect => handle.connect().await?,
        ViewCommand::Disconnect => handle.disconnect().await?,
        ViewCommand::Share(temperature) => {
            let outcome = handle.share_status(temperature).await?;
            print_line(&render_outcome(&outcome));
        }
        ViewCommand::Send { topic, text } => {
            let outcome = handle.send_message(topic, text).await?;
            print_line(&render_outcome(&outcome));
        }
        ViewCommand::Status => print_line(&render_snapshot(&handle.snapshot().await?)),
        ViewCommand::Help => println!("{HELP}"),
        ViewCommand::Quit => return Ok(false),
    }
    Ok(true)
}

async fn run_session(config: LinkConfig, connect: bool) -> Result<(), Box<dyn std::error::Error>> {
    let (transport, transport_events) = MqttClient::new(config.broker.clone())?;
    let (manager, mut session_events) = ConnectionManager::new(
        transport,
        config.topics.builder(),
        config.reconnect.delay(),
    );
    let (session, handle) = Session::new(manager, transport_events, Box::new(SimulatedThermometer));

    let (watch, updates) = start_geo(&config.geo);
    let session_task = session.with_geo(watch, updates).spawn();

    info!(
        broker = %config.broker.url,
        shared_topic = %config.topics.shared,
        "Session ready"
    );
    println!("Type `help` for commands");

    if connect {
        handle.connect().await?;
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
            Some(event) = session_events.recv() => print_line(&render_event(&event)),
            line = lines.next_line() => match line? {
                None => break,
                Some(line) => match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(command)) => {
                        if !dispatch(&handle, command).await? {
                            break;
                        }
                    }
                    Err(e) => print_line(&e.to_string()),
                },
            },
        }
    }

    if let Err(e) = handle.shutdown().await {
        warn!("Session already stopped: {}", e);
    }
    session_task.await?;

    info!("Application shutdown complete");
    Ok(())
}
