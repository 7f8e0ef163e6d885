use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use energy_monitoring::{
    actors::MonitorHandle,
    api::{ApiConfig, ApiState, spawn_api_server},
    broadcaster::Broadcaster,
    config::{Config, read_config_file},
    sampling::Sampler,
    storage,
    util::{get_addr, get_port, get_token},
};
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// How long a tick in progress may take to finish on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Parser)]
#[command(name = "energy-hub")]
#[command(about = "Samples household power, raises alerts and streams readings", long_about = None)]
struct Args {
    /// Config file (defaults are used when omitted)
    #[arg(short)]
    file: Option<String>,

    /// Address to bind the API to [env: ENERGY_HUB_ADDR]
    #[arg(long)]
    addr: Option<IpAddr>,

    /// Port to bind the API to [env: ENERGY_HUB_PORT]
    #[arg(short, long)]
    port: Option<u16>,

    /// Bearer token required by the API [env: ENERGY_HUB_TOKEN]
    #[arg(short, long)]
    token: Option<String>,

    /// Disable permissive CORS
    #[arg(long)]
    no_cors: bool,

    /// Do not start sampling until POST /api/v1/monitor/start
    #[arg(long)]
    paused: bool,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("energy_monitoring", LevelFilter::DEBUG),
        ("energy_hub", LevelFilter::TRACE),
        ("tower_http", LevelFilter::INFO),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = match &args.file {
        Some(file) => read_config_file(file)?,
        None => {
            info!("no config file given, using defaults");
            Config::default()
        }
    };

    let storage_config = config.storage.clone().unwrap_or_default();
    let storage = storage::open_backend(&storage_config)
        .await
        .context("failed to open storage backend")?;

    let broadcaster = Broadcaster::default();
    let sampler = Sampler::new(&config, storage.clone());
    let monitor = MonitorHandle::spawn(sampler, broadcaster.clone(), config.sampling.period());

    let api_config = ApiConfig {
        bind_addr: SocketAddr::new(
            args.addr.unwrap_or_else(get_addr),
            args.port.unwrap_or_else(get_port),
        ),
        auth_token: args.token.clone().or_else(get_token),
        enable_cors: !args.no_cors,
    };
    if api_config.auth_token.is_none() {
        warn!("no API token configured, the API is open to anyone who can reach it");
    }

    let state = ApiState::new(storage.clone(), broadcaster, monitor.clone());
    let addr = spawn_api_server(api_config, state).await?;
    info!("energy hub ready on http://{addr}");

    if !args.paused {
        let stats = monitor.start().await?;
        info!("sampling every {}ms", stats.period_ms);
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    info!("shutting down");

    monitor.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, monitor.stopped())
        .await
        .is_err()
    {
        warn!("monitor did not stop within {}s", SHUTDOWN_GRACE.as_secs());
    }
    if let Err(e) = storage.close().await {
        warn!("failed to close storage: {e}");
    }

    Ok(())
}
