//! CLI Handling module

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use clap::{Parser, Subcommand};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    FleetProbeError, cisco,
    config::{DeviceConfig, FleetConfig},
    endpoints::{EndpointRegistry, TopologySample, resolve_sample, sample_device},
    qualify::{QualifyParams, ReportTable, qualify_device},
    session::{DeviceSession, SessionError, SshSession},
};

/// Fleetprobe - device qualification checks and MAC endpoint resolution
#[derive(Parser)]
#[command(name = "fleetprobe")]
#[command(about = "Fleet qualification checks and MAC endpoint resolution for Cisco networks")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to fleet inventory file
    #[arg(short = 'c', long = "config", default_value = "fleet.json", global = true)]
    config_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the day-one qualification checks across the fleet
    Qualify {
        /// NTP server address to configure and verify on each device
        #[arg(long, value_name = "A.B.C.D")]
        ntp: IpAddr,
        /// Directory for per-device running-config backups
        #[arg(long, default_value = "./backup")]
        backup_dir: PathBuf,
    },
    /// Resolve where a MAC address is attached on the LAN
    Locate {
        /// MAC address to look up
        #[arg(long, value_name = "aaaa.bbbb.cccc")]
        mac: String,
        /// Also print every resolved endpoint
        #[arg(long)]
        all: bool,
    },
}

pub async fn main_func() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let env_filter_str = if cli.debug { "debug" } else { "info" };
    let env_filter = EnvFilter::new(format!(
        "{env_filter_str},russh::client=info,russh::sshbuffer=info"
    ));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(cli.debug)
                .with_thread_ids(false)
                .with_level(true),
        )
        .with(env_filter)
        .init();

    let config_path = &cli.config_path;
    let fleet_config = match FleetConfig::load_from_file(config_path) {
        Ok(config) => {
            info!("Loaded inventory from {}", config_path.display());
            config
        }
        Err(e) => {
            if config_path.exists() {
                error!(
                    "Error loading existing inventory file '{}': {}",
                    config_path.display(),
                    e
                );
                return Err(format!("Inventory file exists but cannot be loaded: {}", e).into());
            }
            info!(
                "Inventory file '{}' not found, creating default",
                config_path.display()
            );
            let config = FleetConfig::default();
            config.save_to_file(config_path)?;
            info!(
                "Created default inventory at '{}' - please edit it to add your devices",
                config_path.display()
            );
            config
        }
    };

    info!("Found {} devices in inventory", fleet_config.devices.len());

    match cli.command {
        Commands::Qualify { ntp, backup_dir } => {
            qualify_command(&fleet_config, ntp, backup_dir).await?;
        }
        Commands::Locate { mac, all } => {
            locate_command(&fleet_config, &mac, all).await?;
        }
    }

    Ok(())
}

fn resolve_address(device: &DeviceConfig) -> Result<SocketAddr, SessionError> {
    if let Some(ip) = device.ip_address {
        return Ok(SocketAddr::new(ip, device.ssh_port()));
    }
    use std::net::ToSocketAddrs;
    let host_port = format!("{}:{}", device.hostname, device.ssh_port());
    host_port
        .to_socket_addrs()
        .map_err(|e| {
            SessionError::Connection(format!(
                "Failed to resolve hostname '{}': {}",
                device.hostname, e
            ))
        })?
        .next()
        .ok_or_else(|| {
            SessionError::Connection(format!(
                "No IP address found for hostname '{}'",
                device.hostname
            ))
        })
}

async fn connect_session(
    device: &DeviceConfig,
    timeout: Duration,
) -> Result<SshSession, SessionError> {
    let address = resolve_address(device)?;
    debug!("Connecting to {} via SSH...", address);
    SshSession::connect(device, address, timeout).await
}

async fn qualify_command(
    config: &FleetConfig,
    ntp: IpAddr,
    backup_dir: PathBuf,
) -> Result<(), FleetProbeError> {
    if config.devices.is_empty() {
        return Err(FleetProbeError::Config(
            "No devices exist in inventory".to_string(),
        ));
    }

    let params = QualifyParams {
        ntp_server: ntp,
        backup_dir,
    };
    let table = Arc::new(ReportTable::new());
    let timeout = config.ssh_timeout();

    let mut tasks = JoinSet::new();
    for (name, device) in config.devices.clone() {
        let params = params.clone();
        let table = Arc::clone(&table);
        tasks.spawn(async move {
            let outcome =
                qualify_device(&name, connect_session(&device, timeout), &params).await;
            table.insert(outcome);
        });
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("Device worker failed: {}", e);
        }
    }

    info!("Results");
    for outcome in table.snapshot() {
        println!("{}", outcome.report);
    }

    Ok(())
}

async fn locate_command(
    config: &FleetConfig,
    mac_arg: &str,
    show_all: bool,
) -> Result<(), FleetProbeError> {
    if config.devices.is_empty() {
        return Err(FleetProbeError::Config(
            "No devices exist in inventory".to_string(),
        ));
    }

    let target = cisco::parse_mac(mac_arg)?;
    let registry = Arc::new(EndpointRegistry::new());
    let timeout = config.ssh_timeout();

    let mut tasks = JoinSet::new();
    for (name, device) in config.devices.clone() {
        let registry = Arc::clone(&registry);
        tasks.spawn(async move {
            match sample_switch(&name, &device, timeout).await {
                Ok(sample) => resolve_sample(&sample, &registry),
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        });
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            error!("Device worker failed: {}", e);
        }
    }

    if show_all {
        info!("All endpoints:");
        for endpoint in registry.list_all() {
            println!("{}", endpoint);
        }
    }

    match registry.get(&target) {
        Some(endpoint) => println!("{}", endpoint),
        None => println!("{} doesn't exist on LAN", target),
    }

    Ok(())
}

async fn sample_switch(
    name: &str,
    device: &DeviceConfig,
    timeout: Duration,
) -> Result<TopologySample, FleetProbeError> {
    let mut session = connect_session(device, timeout).await?;
    let sample = sample_device(name, &mut session).await;
    if let Err(e) = session.close().await {
        debug!("Disconnect from {} failed: {}", name, e);
    }
    sample
}
