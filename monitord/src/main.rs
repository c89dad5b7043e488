use anyhow::{Context, Result};
use clap::Parser;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

mod logging;
mod sink;

use device_monitor::{
    ChannelSink, DeviceId, Inventory, MonitorSupervisor, PayloadSink, RpcClient, RpcConfig,
};
use logging::LogFormat;
use sink::JsonLinesSink;

/// Device telemetry monitor
///
/// Loads a device inventory, polls every device on its own interval and
/// writes one normalized JSON payload per poll to stdout.
#[derive(Parser, Debug)]
#[command(name = "monitord")]
#[command(about = "Poll environmental devices and emit normalized telemetry as JSON lines")]
#[command(version)]
pub struct Args {
    /// Device inventory file (TOML)
    #[arg(short, long, default_value = "devices.toml")]
    pub config: PathBuf,

    /// Log level (error, warn, info, debug, trace). TRAJJA_LOG overrides it.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// TCP connect deadline for each device exchange, in seconds
    #[arg(long, default_value = "5")]
    pub connect_timeout_secs: u64,

    /// Reply deadline for each device exchange, in seconds
    #[arg(long, default_value = "10")]
    pub read_timeout_secs: u64,

    /// Print the validated inventory and exit
    #[arg(long)]
    pub list: bool,

    /// Poll every device once, then exit
    #[arg(long)]
    pub once: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Connect timeout must be positive"));
        }

        if self.read_timeout_secs == 0 {
            return Err(anyhow::anyhow!("Read timeout must be positive"));
        }

        match self.log_level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}'. Valid levels: error, warn, info, debug, trace",
                    self.log_level
                ));
            }
        }

        Ok(())
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig::default().with_timeouts(
            Duration::from_secs(self.connect_timeout_secs),
            Duration::from_secs(self.read_timeout_secs),
        )
    }
}

/// Render the inventory grouped by room
fn format_inventory(inventory: &Inventory) -> String {
    let mut out = format!("{} device(s)\n", inventory.len());
    for (room, devices) in inventory.by_room() {
        out.push_str(&format!("{}:\n", room.unwrap_or("(no room)")));
        for device in devices {
            out.push_str(&format!(
                "  {:<16} {:<13} {:<22} every {}m\n",
                device.display_name(),
                device.class.as_str(),
                device.address,
                device.poll_interval_minutes
            ));
        }
    }
    out
}

/// Register every inventory entry. A device that fails registration is
/// skipped; the rest still run.
fn register_inventory(
    supervisor: &MonitorSupervisor,
    inventory: &Inventory,
    client: &RpcClient,
) -> Result<usize> {
    let mut registered = 0;
    for descriptor in inventory.devices() {
        match supervisor.register_descriptor(descriptor, client) {
            Ok(()) => registered += 1,
            Err(e) => warn!(device_id = %descriptor.id, error = %e, "skipping device"),
        }
    }

    if registered == 0 {
        return Err(anyhow::anyhow!("No device could be registered"));
    }
    info!(devices = registered, "registered inventory");
    Ok(registered)
}

/// Poll until interrupted
async fn run_forever(inventory: &Inventory, client: &RpcClient) -> Result<()> {
    let supervisor = MonitorSupervisor::new(JsonLinesSink::stdout());
    register_inventory(&supervisor, inventory, client)?;

    let report = supervisor.start_all();
    if report.started.is_empty() {
        return Err(anyhow::anyhow!("No poll worker could be started"));
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Received shutdown signal");

    supervisor.shutdown().await;
    info!("{}", supervisor.stats());
    Ok(())
}

/// One poll per device. Each worker is stopped as soon as its first payload
/// arrives.
async fn run_once(inventory: &Inventory, client: &RpcClient) -> Result<()> {
    let (channel, mut payloads) = ChannelSink::new();
    let supervisor = MonitorSupervisor::new(channel);
    register_inventory(&supervisor, inventory, client)?;

    let report = supervisor.start_all();
    let mut pending: BTreeSet<DeviceId> = report.started.into_iter().collect();
    let output = JsonLinesSink::stdout();

    while !pending.is_empty() {
        let Some(payload) = payloads.recv().await else {
            break;
        };
        if pending.remove(payload.device_id()) {
            supervisor.stop(payload.device_id())?;
            output.accept(payload);
        }
    }

    supervisor.shutdown().await;
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let inventory = Inventory::load(&args.config)
        .with_context(|| format!("Failed to load inventory from {}", args.config.display()))?;

    if args.list {
        print!("{}", format_inventory(&inventory));
        return Ok(());
    }

    if inventory.is_empty() {
        return Err(anyhow::anyhow!(
            "Inventory {} lists no devices",
            args.config.display()
        ));
    }

    let client = RpcClient::with_config(args.rpc_config());
    if args.once {
        run_once(&inventory, &client).await
    } else {
        run_forever(&inventory, &client).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    args.validate()?;

    logging::init_logging(&args.log_level.to_lowercase(), args.log_format)
        .context("Failed to initialize logging")?;

    info!(config = %args.config.display(), "Starting monitord");

    if let Err(e) = run(args).await {
        error!("monitord failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}
