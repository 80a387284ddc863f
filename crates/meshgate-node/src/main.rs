//! Meshgate - Zigbee to MQTT gateway
//!
//! This binary runs a gateway that:
//! - Drives a Zigbee coordinator through an external coprocessor driver (TCP)
//! - Publishes decoded device traffic to an MQTT broker
//! - Turns MQTT requests into device commands and registry queries

mod gateway;

use anyhow::{Context, Result};
use clap::Parser;
use meshgate_core::GatewayConfig;
use meshgate_mqtt::MqttBusClient;
use meshgate_zcl::SchemaCatalog;
use meshgate_zigbee::TcpRadioTransport;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gateway::Gateway;

#[derive(Parser)]
#[command(name = "meshgate")]
#[command(about = "Zigbee to MQTT gateway")]
#[command(version = meshgate_core::VERSION)]
struct Args {
    /// Configuration file
    #[arg(long, short, default_value = "./meshgate.toml")]
    config: PathBuf,

    /// Enable verbose logging (ignored when RUST_LOG is set)
    #[arg(long, short)]
    verbose: bool,
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level
fn log_filter(verbose: bool, log_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { log_level };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = GatewayConfig::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(args.verbose, &config.log_level))
        .with_target(true)
        .init();

    if let Err(e) = run(config).await {
        error!(error = %format!("{:#}", e), "Gateway failed");
        return Err(e);
    }

    Ok(())
}

async fn run(config: GatewayConfig) -> Result<()> {
    info!(version = meshgate_core::VERSION, "Starting meshgate");

    let catalog = SchemaCatalog::load(&config.schema_path)
        .with_context(|| format!("failed to load schema {}", config.schema_path.display()))?;
    info!(path = %config.schema_path.display(), "Cluster schema loaded");

    let radio = TcpRadioTransport::connect(config.radio.address.clone())
        .await
        .with_context(|| format!("failed to connect to radio at {}", config.radio.address))?
        .with_request_timeout(config.radio.query_timeout);

    let shutdown = CancellationToken::new();
    let (bus, inbound, mqtt_task) = MqttBusClient::start(&config.mqtt, shutdown.clone());

    let gateway = match Gateway::start(
        &config,
        Arc::new(catalog),
        Arc::new(radio),
        bus,
        inbound,
        shutdown.clone(),
    )
    .await
    {
        Ok(gateway) => gateway,
        Err(e) => {
            shutdown.cancel();
            let _ = mqtt_task.await;
            return Err(e);
        }
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        }
        signal.cancel();
    });

    info!(
        adapter = %gateway.adapter().ieee_address,
        "Gateway is running. Press Ctrl+C to stop."
    );
    let result = gateway.run().await;

    shutdown.cancel();
    if let Err(e) = mqtt_task.await {
        warn!(error = %e, "MQTT client task ended abnormally");
    }

    result
}
