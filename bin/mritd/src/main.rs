//! ---
//! mrit_section: "01-core-functionality"
//! mrit_subsection: "binary"
//! mrit_type: "source"
//! mrit_scope: "code"
//! mrit_description: "Binary entrypoint for the MRIT gateway daemon."
//! mrit_version: "v0.1.0"
//! mrit_owner: "tbd"
//! ---
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mrit_api::{ApiState, GatewayHost, ROUTES};
use mrit_common::config::{GatewayConfig, Mode};
use mrit_common::logging::init_tracing;
use mrit_device::{BridgeConnector, CommandDispatcher, OutletConnector, SimulatedConnector};
use mrit_registry::{ConfigStore, DeviceRegistry};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "MRIT gateway daemon", long_about = None)]
struct Cli {
    #[arg(long, value_name = "FILE", help = "Path to runtime configuration file")]
    config: Option<PathBuf>,

    #[arg(long, value_name = "FILE", help = "Override the site document location")]
    site_config: Option<PathBuf>,

    #[arg(long, value_enum, help = "Override application mode")]
    mode: Option<CliMode>,

    #[arg(
        long,
        global = true,
        value_name = "NAME",
        help = "Site name used when the site document is first created"
    )]
    site_name: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMode {
    Production,
    Simulation,
}

impl From<CliMode> for Mode {
    fn from(value: CliMode) -> Self {
        match value {
            CliMode::Production => Mode::Production,
            CliMode::Simulation => Mode::Simulation,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Serve the gateway API")]
    Run,
    #[command(about = "Create the site document if missing and exit")]
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let candidates = [
        PathBuf::from("mritd.toml"),
        PathBuf::from("/etc/mrit/mritd.toml"),
    ];
    let loaded = GatewayConfig::load_with_source(cli.config.as_deref(), &candidates)?;
    let mut config = loaded.config;
    if let Some(mode) = cli.mode {
        config.mode = mode.into();
    }
    if let Some(path) = &cli.site_config {
        config.site.config_path = path.clone();
    }
    init_tracing("mritd", &config.logging)?;

    match &loaded.source {
        Some(path) => info!(config_path = %path.display(), mode = ?config.mode, "configuration loaded"),
        None => info!(mode = ?config.mode, "no configuration file found; using defaults"),
    }

    let store = ConfigStore::new(&config.site.config_path)
        .with_default_site_name(config.site.default_name.clone());
    let site = match cli.site_name.as_deref() {
        Some(name) => store.load_or_create_with(Some(name)),
        None => store.load_or_create(),
    }
    .with_context(|| {
        format!(
            "refusing to start with site document {}",
            store.path().display()
        )
    })?;
    info!(
        site = %site.site_name,
        http_port = site.http_port,
        devices = site.devices.len(),
        site_config = %store.path().display(),
        "site document ready"
    );

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Init => Ok(()),
        Commands::Run => run_gateway(config, store, site).await,
    }
}

async fn run_gateway(
    config: GatewayConfig,
    store: ConfigStore,
    site: mrit_registry::SiteConfiguration,
) -> Result<()> {
    let site_name = site.site_name.clone();
    let addr = SocketAddr::new(config.api.bind, site.http_port);
    let registry = Arc::new(DeviceRegistry::new(store, site));
    let dispatcher = CommandDispatcher::new(build_connector(&config), site_name.clone());
    let state = Arc::new(ApiState::new(registry, dispatcher));

    let mut host = GatewayHost::start(state, addr)?;
    info!(site = %site_name, address = %host.addr(), "gateway listening");
    for (method, path, summary) in ROUTES {
        info!(site = %site_name, "  {method:<4} {path:<9} {summary}");
    }

    let mut ticker = tokio::time::interval(config.host.status_interval());
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("failed to listen for ctrl-c")?;
                info!(site = %site_name, "ctrl-c received; shutting down");
                break;
            }
            _ = ticker.tick() => {
                let status = host.status();
                if !status.running {
                    error!(site = %site_name, "api worker is no longer running");
                    break;
                }
                tracing::debug!(
                    site = %status.site_name,
                    devices = status.devices_count,
                    http_port = status.http_port,
                    "gateway healthy"
                );
            }
        }
    }

    match tokio::task::spawn_blocking(move || host.stop()).await {
        Ok(()) => info!(site = %site_name, "gateway stopped"),
        Err(err) => warn!(site = %site_name, error = %err, "gateway stop did not complete"),
    }
    Ok(())
}

fn build_connector(config: &GatewayConfig) -> Arc<dyn OutletConnector> {
    match config.mode {
        Mode::Simulation => {
            info!(
                unreachable = ?config.simulation.unreachable,
                "simulation mode: commands answered by in-memory outlets"
            );
            Arc::new(
                SimulatedConnector::new().with_unreachable(config.simulation.unreachable.clone()),
            )
        }
        Mode::Production => {
            info!(
                program = %config.connector.program,
                timeout_secs = config.connector.timeout_seconds,
                "production mode: commands sent through device client"
            );
            Arc::new(BridgeConnector::new(
                config.connector.program.clone(),
                config.connector.args.clone(),
                config.connector.timeout(),
            ))
        }
    }
}
