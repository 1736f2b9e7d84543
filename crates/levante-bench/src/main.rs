//! Levante Bench - Main entry point
//!
//! Drives update coordinators against emulated fans, either as a long
//! running refresh loop or as one-shot commands.

mod config;
mod state;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use levante_core::{BoostRequest, FanSpeedTargetKey, FAN_SPEED_MAX, FAN_SPEED_MIN};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::state::BenchState;

#[derive(Parser, Debug)]
#[command(name = "levante-bench")]
#[command(about = "Exercise Levante fan coordinators against emulated devices")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "levante.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Refresh every device periodically until interrupted
    Run {
        /// Stop after this many seconds
        #[arg(long)]
        duration_secs: Option<u64>,
    },
    /// Print the cached state of every device as JSON
    Status,
    /// Change one fan speed target
    SetTarget {
        /// Device address, optional with a single device
        #[arg(short, long)]
        address: Option<String>,
        /// humidity, light or base
        key: FanSpeedTargetKey,
        /// Target speed in RPM
        value: u16,
    },
    /// Turn boost on or off
    Boost {
        #[arg(short, long)]
        address: Option<String>,
        /// Turn boost off instead of on
        #[arg(long)]
        off: bool,
        /// Boost speed in RPM
        #[arg(long)]
        speed: Option<u16>,
        /// Boost duration in seconds
        #[arg(long)]
        seconds: Option<u16>,
    },
    /// Read sensitivity, boost and pin straight from the device
    Inspect {
        #[arg(short, long)]
        address: Option<String>,
    },
    /// Write a sample configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Serialize)]
struct Inspection {
    address: String,
    fan_sensitivity: levante_core::FanSensitivitySetting,
    boost: levante_core::Boost,
    pin_reported: bool,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Levante bench v{}", env!("CARGO_PKG_VERSION"));

    let command = args
        .command
        .unwrap_or(Command::Run {
            duration_secs: None,
        });

    if let Command::InitConfig { force } = command {
        if args.config.exists() && !force {
            bail!(
                "{} already exists, pass --force to overwrite",
                args.config.display()
            );
        }
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote sample configuration");
        return Ok(());
    }

    // Load configuration
    let config = config::load_config(&args.config)?;
    info!(
        devices = config.devices.len(),
        update_interval_secs = config.bench.update_interval_secs,
        "Configuration loaded"
    );

    let state = BenchState::new(config).await?;
    let result = run_command(&state, command).await;
    state.registry.shutdown().await;
    result
}

async fn run_command(state: &BenchState, command: Command) -> Result<()> {
    match command {
        Command::Run { duration_secs } => {
            let ready = state.registry.addresses().await;
            if ready.is_empty() {
                bail!("No devices are ready");
            }
            info!(devices = ready.len(), "Running, press Ctrl-C to stop");

            match duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => tokio::signal::ctrl_c().await?,
            }
            info!("Stopping");
        }
        Command::Status => {
            print_json(&state.reports().await)?;
        }
        Command::SetTarget { address, key, value } => {
            if !(FAN_SPEED_MIN..=FAN_SPEED_MAX).contains(&value) {
                warn!(
                    value,
                    min = FAN_SPEED_MIN,
                    max = FAN_SPEED_MAX,
                    "Value is outside the range the fan accepts"
                );
            }
            let coordinator = state.coordinator(address.as_deref()).await?;
            coordinator.set_fan_speed_target(key, value).await?;
            print_json(&state.report(&coordinator).await)?;
        }
        Command::Boost {
            address,
            off,
            speed,
            seconds,
        } => {
            let coordinator = state.coordinator(address.as_deref()).await?;
            let request = BoostRequest {
                active: !off,
                fan_speed_target: speed,
                timeleft_seconds: seconds,
            };
            coordinator.set_boost_request(request).await?;
            print_json(&state.report(&coordinator).await)?;
        }
        Command::Inspect { address } => {
            let coordinator = state.coordinator(address.as_deref()).await?;
            let inspection = Inspection {
                address: coordinator.address().to_string(),
                fan_sensitivity: coordinator.read_fan_sensitivity().await?,
                boost: coordinator.read_boost().await?,
                pin_reported: coordinator.read_device_pin().await?.is_set(),
            };
            print_json(&inspection)?;
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}
