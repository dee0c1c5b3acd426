mod cli;
mod config;
mod logging;
mod rumqttc_wrapper;
mod shutdown;

use std::process::ExitCode;

use clap::Parser;
use cli::{Cli, Command};
use config::Config;
use kostal2mqtt::home_assistant::HomeAssistant;
use kostal2mqtt::json_lines::JsonLines;
use kostal2mqtt::metric_collector::MetricCollector;
use kostal2mqtt::plenticore::PlenticoreClient;
use kostal2mqtt::poll_cycle::PollCycleController;
use kostal2mqtt::simple_mqtt::SimpleMqtt;
use log::{error, info, warn};
use rumqttc_wrapper::RumqttcWrapper;
use tokio_util::sync::CancellationToken;

const EXIT_FAILURE: u8 = 1;
const EXIT_NOT_CONFIGURED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);
    info!("Running revision: {}", env!("GIT_HASH"));

    let path = config::locate(cli.config.as_deref());
    let mut config = match Config::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    let command = cli.command.unwrap_or(Command::Run);
    if let Command::Setup(setup) = &command {
        config.apply_setup(setup);
        return match config.save(&path) {
            Ok(()) => {
                info!("configuration written to {}", path.display());
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{e:#}");
                ExitCode::from(EXIT_FAILURE)
            }
        };
    }

    if let Some(host_config) = cli.host_config.or_else(config::default_host_config) {
        match config.apply_host_config(&host_config) {
            Ok(true) => info!("using KOSTAL platform settings from {}", host_config.display()),
            Ok(false) => info!("no KOSTAL platform in {}", host_config.display()),
            Err(e) => warn!("ignoring host configuration: {e:#}"),
        }
    }
    config.apply_env();

    if !config.is_valid() {
        error!(
            "no inverter host configured. Run `setup --host <address>`, set INVERTER_HOST or add \
             inverter_host to {}",
            path.display()
        );
        return ExitCode::from(EXIT_NOT_CONFIGURED);
    }

    let settings = config.poll_settings();
    info!("inverter host: {}", settings.host);
    let device = match PlenticoreClient::new(settings.call_timeout) {
        Ok(device) => device,
        Err(e) => {
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match command {
        Command::Once => {
            let mut controller =
                PollCycleController::new(device, settings, vec![Box::new(JsonLines::stdout())]);
            match controller.run_cycle(&CancellationToken::new()).await {
                Some(record) if record.is_success() => ExitCode::SUCCESS,
                _ => ExitCode::from(EXIT_FAILURE),
            }
        }
        Command::Detect => {
            let controller = PollCycleController::new(device, settings, Vec::new());
            match controller.identify().await {
                Ok(device_info) => {
                    info!(
                        "found {} with serial number {}, firmware {}",
                        device_info.model, device_info.serial_number, device_info.version
                    );
                    match serde_json::to_string_pretty(&device_info) {
                        Ok(json) => println!("{json}"),
                        Err(e) => warn!("could not print device info: {e}"),
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}: {}", e.kind(), e.detail());
                    ExitCode::from(EXIT_FAILURE)
                }
            }
        }
        Command::Run | Command::Setup(_) => {
            let mut output_channels: Vec<Box<dyn MetricCollector>> = Vec::new();
            if config.stdout.unwrap_or(true) {
                info!("Printing records as JSON lines");
                output_channels.push(Box::new(JsonLines::stdout()));
            }
            if let Some(mqtt) = config.home_assistant.as_ref().filter(|c| c.is_valid()) {
                info!("Publishing to Home Assistant");
                output_channels.push(Box::new(HomeAssistant::<RumqttcWrapper>::new(mqtt)));
            }
            if let Some(mqtt) = config.simple_mqtt.as_ref().filter(|c| c.is_valid()) {
                info!("Publishing to simple MQTT broker");
                output_channels.push(Box::new(SimpleMqtt::<RumqttcWrapper>::new(mqtt)));
            }
            if output_channels.is_empty() {
                warn!("all outputs disabled, polling without publishing");
            }

            let shutdown = CancellationToken::new();
            let trigger = shutdown.clone();
            tokio::spawn(async move {
                shutdown::wait_for_shutdown().await;
                info!("shutdown requested");
                trigger.cancel();
            });

            let mut controller = PollCycleController::new(device, settings, output_channels);
            controller.run(shutdown).await;
            ExitCode::SUCCESS
        }
    }
}
