//! Gateway assembly and lifecycle
//!
//! Startup order matters:
//!
//! 1. open the device registry
//! 2. build the radio router and subscribe the bus router to its events
//! 3. initialise the radio (fatal on failure); the adapter record reaches
//!    the bus because the subscriptions already exist
//! 4. run the radio loop
//!
//! Shutdown cancels both routers, waits for them (the radio router stops
//! the transport last) and closes the registry.

use anyhow::{anyhow, Context, Result};
use meshgate_core::{ConfigStore, Device, GatewayConfig, GatewaySettings};
use meshgate_mqtt::{BusClient, BusMessage, BusRouter};
use meshgate_state::{open_registry, DeviceRegistry};
use meshgate_zcl::SchemaCatalog;
use meshgate_zigbee::{RadioRouter, RadioTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A running gateway
pub struct Gateway {
    adapter: Device,
    registry: Arc<dyn DeviceRegistry>,
    shutdown: CancellationToken,
    radio_task: JoinHandle<meshgate_zigbee::Result<()>>,
    bus_task: JoinHandle<meshgate_mqtt::Result<()>>,
}

impl Gateway {
    /// Wire the routers to the given transports and initialise the radio
    pub async fn start(
        config: &GatewayConfig,
        catalog: Arc<SchemaCatalog>,
        radio: Arc<dyn RadioTransport>,
        bus: Arc<dyn BusClient>,
        inbound: mpsc::Receiver<BusMessage>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let registry = open_registry(&config.registry)
            .await
            .context("failed to open device registry")?;
        let settings = ConfigStore::new(GatewaySettings::from(config));

        let (radio_router, handle) =
            RadioRouter::new(config, radio, registry.clone(), catalog, settings.clone());
        let bus_router = BusRouter::new(config, bus, handle, registry.clone(), settings);
        let bus_task = tokio::spawn(bus_router.run(inbound, shutdown.clone()));

        let adapter = match radio_router.initialise().await {
            Ok(adapter) => adapter,
            Err(e) => {
                shutdown.cancel();
                let _ = bus_task.await;
                if let Err(close) = registry.close().await {
                    warn!(error = %close, "Failed to close device registry");
                }
                return Err(e).context("failed to initialise radio");
            }
        };

        let radio_task = tokio::spawn(radio_router.run(shutdown.clone()));

        info!(adapter = %adapter.ieee_address, "Gateway started");

        Ok(Self {
            adapter,
            registry,
            shutdown,
            radio_task,
            bus_task,
        })
    }

    /// The coordinator's own record
    pub fn adapter(&self) -> &Device {
        &self.adapter
    }

    /// Run until shutdown is requested or a router stops on its own
    pub async fn run(self) -> Result<()> {
        let Self {
            registry,
            shutdown,
            mut radio_task,
            mut bus_task,
            ..
        } = self;

        let mut radio_done = None;
        let mut bus_done = None;

        tokio::select! {
            _ = shutdown.cancelled() => {}
            result = &mut radio_task => {
                error!("Radio router stopped unexpectedly");
                radio_done = Some(result);
            }
            result = &mut bus_task => {
                error!("Bus router stopped unexpectedly");
                bus_done = Some(result);
            }
        }

        shutdown.cancel();

        let radio_result = match radio_done {
            Some(result) => result,
            None => radio_task.await,
        };
        let bus_result = match bus_done {
            Some(result) => result,
            None => bus_task.await,
        };

        if let Err(e) = registry.close().await {
            warn!(error = %e, code = e.error_code(), "Failed to close device registry");
        }

        flatten(radio_result, "radio router")?;
        flatten(bus_result, "bus router")?;

        info!("Gateway stopped");
        Ok(())
    }
}

fn flatten<E>(result: std::result::Result<std::result::Result<(), E>, JoinError>, name: &str) -> Result<()>
where
    E: std::error::Error + Send + Sync + 'static,
{
    match result {
        Ok(inner) => inner.with_context(|| format!("{} failed", name)),
        Err(e) => Err(anyhow!("{} task panicked: {}", name, e)),
    }
}
