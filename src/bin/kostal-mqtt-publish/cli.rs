use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use kostal2mqtt::{device_client::AuthScheme, value_mapper::EnergyTodayFallback};

#[derive(Debug, Parser)]
#[command(version, about = "Publishes KOSTAL inverter telemetry as JSON or via MQTT")]
pub struct Cli {
    /// Configuration file, defaults to config.toml in the working directory or next to the
    /// executable
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Host configuration (Homebridge config.json) whose KOSTAL platform entry overrides the
    /// configuration file
    #[arg(long, global = true, env = "HOMEBRIDGE_CONFIG")]
    pub host_config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll the inverter until interrupted (default)
    Run,
    /// Fetch one record, print it and exit
    Once,
    /// Write the configuration file from the given parameters
    Setup(SetupArgs),
    /// Print serial number, model and firmware version of the inverter
    Detect,
}

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Inverter address
    #[arg(long)]
    pub host: String,
    #[arg(long)]
    pub username: Option<String>,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long, value_enum)]
    pub auth: Option<AuthArg>,
    /// Milliseconds between two polls
    #[arg(long)]
    pub update_interval: Option<u64>,
    #[arg(long, value_enum)]
    pub energy_today_fallback: Option<FallbackArg>,
    /// Broker for the per-field MQTT topics
    #[arg(long)]
    pub mqtt_host: Option<String>,
    #[arg(long)]
    pub mqtt_port: Option<u16>,
    #[arg(long)]
    pub mqtt_username: Option<String>,
    #[arg(long)]
    pub mqtt_password: Option<String>,
    /// Also publish Home Assistant discovery on the same broker
    #[arg(long)]
    pub home_assistant: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum AuthArg {
    Anonymous,
    Basic,
}

impl From<AuthArg> for AuthScheme {
    fn from(value: AuthArg) -> Self {
        match value {
            AuthArg::Anonymous => AuthScheme::Anonymous,
            AuthArg::Basic => AuthScheme::Basic,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum FallbackArg {
    None,
    Total,
}

impl From<FallbackArg> for EnergyTodayFallback {
    fn from(value: FallbackArg) -> Self {
        match value {
            FallbackArg::None => EnergyTodayFallback::None,
            FallbackArg::Total => EnergyTodayFallback::Total,
        }
    }
}
