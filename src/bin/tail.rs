//! Command line subscriber for the energy hub
//!
//! `watch` follows the push channel and prints every message as one JSON line on stdout;
//! the other subcommands query the REST API once.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use energy_monitoring::{
    client::{
        ConnectionHandle, ConnectionState, api::ApiClient, config::TailConfig,
        websocket::WebSocketConnector,
    },
    protocol::Payload,
};
use tracing::{error, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "energy-tail")]
#[command(about = "Follow and query an energy hub", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// API server URL (overrides config file)
    #[arg(short, long, value_name = "URL")]
    url: Option<String>,

    /// API authentication token (overrides config file)
    #[arg(short, long, value_name = "TOKEN")]
    token: Option<String>,

    /// Log connection state changes
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream live updates until interrupted
    Watch {
        /// Only print energy updates
        #[arg(long)]
        updates_only: bool,
    },
    /// Print the most recent reading and its circuits
    Latest,
    /// Print unacknowledged alerts
    Alerts,
    /// Acknowledge an alert
    Ack { id: String },
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("energy_monitoring", level),
        ("energy_tail", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_target(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = TailConfig::load(args.config.as_deref())?;
    let config = TailConfig {
        api_url: args.url.unwrap_or(config.api_url),
        api_token: args.token.or(config.api_token),
        ..config
    };

    match args.command {
        Command::Watch { updates_only } => watch(&config, updates_only).await,
        Command::Latest => {
            let client = ApiClient::new(&config.api_url, config.api_token.clone());
            let Some(reading) = client.latest_reading().await? else {
                bail!("the hub has not stored any reading yet");
            };
            println!("{}", serde_json::to_string_pretty(&reading)?);
            for circuit in client.circuits().await? {
                println!(
                    "{:<12} {:>8.1} W {:>5.1}% {}",
                    circuit.circuit_name, circuit.power, circuit.percentage, circuit.status
                );
            }
            Ok(())
        }
        Command::Alerts => {
            let client = ApiClient::new(&config.api_url, config.api_token.clone());
            for alert in client.active_alerts().await? {
                println!(
                    "{} [{}] {} ({})",
                    alert.timestamp.to_rfc3339(),
                    alert.severity,
                    alert.message,
                    alert.id
                );
            }
            Ok(())
        }
        Command::Ack { id } => {
            let client = ApiClient::new(&config.api_url, config.api_token.clone());
            if !client.acknowledge_alert(&id).await? {
                bail!("unknown alert '{id}'");
            }
            println!("acknowledged {id}");
            Ok(())
        }
    }
}

async fn watch(config: &TailConfig, updates_only: bool) -> Result<()> {
    let connector = WebSocketConnector::new(&config.api_url, config.api_token.clone());
    info!("following {}", connector.url());

    let (handle, mut inbound) = ConnectionHandle::spawn(connector, config.connection_options());
    let mut status = handle.subscribe_status();
    handle.connect();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.disconnect();
                break;
            }

            changed = status.changed() => {
                if changed.is_err() {
                    bail!("connection manager stopped unexpectedly");
                }
                let current = status.borrow_and_update().clone();
                info!("connection {} (attempt {})", current.state, current.attempts);
                if current.state == ConnectionState::Failed {
                    let reason = current.last_error.unwrap_or_default();
                    error!("giving up: {reason}");
                    bail!("could not reach {}: {reason}", config.api_url);
                }
            }

            envelope = inbound.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                if updates_only && !matches!(envelope.payload, Payload::EnergyUpdate(_)) {
                    continue;
                }
                println!("{}", envelope.to_text()?);
            }
        }
    }

    handle.shutdown();
    Ok(())
}
