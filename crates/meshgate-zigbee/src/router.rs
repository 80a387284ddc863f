//! RadioRouter - Radio event intake and outbound command handling
//!
//! The router sits between the radio transport and the rest of the
//! gateway. It handles:
//!
//! - Radio → gateway: node join/leave/update and application messages are
//!   recorded in the device registry, decoded against the schema catalog and
//!   fanned out as normalized events
//! - Gateway → radio: [`DeviceCommand`]s are encoded into cluster library
//!   frames and sent to the addressed node
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          RadioRouter                          │
//! ├───────────────────────────────────────────────────────────────┤
//! │                                                               │
//! │  ┌───────────┐  read   ┌──────────┐  shard by   ┌──────────┐  │
//! │  │ Transport │────────►│ run loop │────────────►│ worker N │  │
//! │  └───────────┘         └──────────┘   address   └────┬─────┘  │
//! │        ▲                                            │        │
//! │        │ send / query    registry upsert, decode    ▼        │
//! │  ┌─────┴───────┐                           ┌──────────────┐  │
//! │  │ RouterHandle│◄── DeviceCommand          │EventChannels │  │
//! │  └─────────────┘                           └──────────────┘  │
//! │                                                               │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events for one hardware address always land on the same worker, so
//! they are handled in arrival order. Each worker has a bounded queue;
//! when it stays full for longer than the enqueue timeout the event is
//! dropped with a warning rather than stalling intake.
//!
//! # Example
//!
//! ```rust,ignore
//! let (router, handle) = RadioRouter::new(&config, transport, registry, catalog, settings);
//! let mut messages = handle.events().subscribe_messages();
//!
//! router.initialise().await?;
//! tokio::spawn(router.run(shutdown.clone()));
//!
//! handle.execute(DeviceCommand::ExploreDevice { address }).await?;
//! ```

use meshgate_core::{ConfigStore, Device, GatewayConfig, IeeeAddress, ZigbeeNetworkConfig};
use meshgate_state::DeviceRegistry;
use meshgate_zcl::cluster::status;
use meshgate_zcl::commands::{AttributeRecord, ReadAttributes, WriteAttributes};
use meshgate_zcl::{
    ApplicationMessage, AttributeDescriptor, AttributeValue, ClusterDescriptor, Direction,
    FieldSetter, LocalCommand, SchemaCatalog, ZclCodec, ZclCommand, GATEWAY_ENDPOINT,
    PROFILE_HOME_AUTOMATION,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::commands::DeviceCommand;
use crate::error::{RadioError, Result};
use crate::events::{AttributeReport, DeviceDescription, DeviceMessage, DeviceMessageBody, EventChannels};
use crate::transport::{EndpointRegistration, RadioEvent, RadioTransport};

/// Outbound frames are sent without requesting an APS acknowledgement
const REQUIRE_ACK: bool = false;

/// Pause after a transient read failure
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Router statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouterStats {
    /// Events read from the transport
    pub events_received: u64,
    /// Events dropped because a worker queue stayed full
    pub events_dropped: u64,
    /// Device messages published to subscribers
    pub messages_published: u64,
    /// Decoded commands the router does not forward
    pub messages_ignored: u64,
    /// Application payloads that failed to decode
    pub decode_errors: u64,
    /// Registry writes that failed
    pub registry_errors: u64,
    /// Transport read failures
    pub read_errors: u64,
    /// Outbound commands completed
    pub commands_sent: u64,
    /// Outbound commands that failed
    pub command_errors: u64,
}

#[derive(Default)]
struct Counters {
    events_received: AtomicU64,
    events_dropped: AtomicU64,
    messages_published: AtomicU64,
    messages_ignored: AtomicU64,
    decode_errors: AtomicU64,
    registry_errors: AtomicU64,
    read_errors: AtomicU64,
    commands_sent: AtomicU64,
    command_errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> RouterStats {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RouterStats {
            events_received: get(&self.events_received),
            events_dropped: get(&self.events_dropped),
            messages_published: get(&self.messages_published),
            messages_ignored: get(&self.messages_ignored),
            decode_errors: get(&self.decode_errors),
            registry_errors: get(&self.registry_errors),
            read_errors: get(&self.read_errors),
            commands_sent: get(&self.commands_sent),
            command_errors: get(&self.command_errors),
        }
    }
}

/// State shared by the run loop, the workers and every handle
struct Shared {
    transport: Arc<dyn RadioTransport>,
    registry: Arc<dyn DeviceRegistry>,
    catalog: Arc<SchemaCatalog>,
    codec: ZclCodec,
    settings: ConfigStore,
    events: EventChannels,
    counters: Counters,
    query_timeout: Duration,
}

/// Handle for issuing commands and subscribing to router events
#[derive(Clone)]
pub struct RouterHandle {
    shared: Arc<Shared>,
}

impl RouterHandle {
    /// Carry out a command against the radio
    ///
    /// Safe to call concurrently. Failures are logged here and returned so
    /// the caller can report them.
    pub async fn execute(&self, command: DeviceCommand) -> Result<()> {
        let name = command.name();
        let address = command.address();

        match self.shared.execute(command).await {
            Ok(()) => {
                Counters::bump(&self.shared.counters.commands_sent);
                Ok(())
            }
            Err(e) => {
                Counters::bump(&self.shared.counters.command_errors);
                warn!(
                    command = name,
                    ieee = ?address,
                    error = %e,
                    code = e.error_code(),
                    "Device command failed"
                );
                Err(e)
            }
        }
    }

    /// Event subscriptions
    pub fn events(&self) -> &EventChannels {
        &self.shared.events
    }

    /// Get router statistics
    pub fn stats(&self) -> RouterStats {
        self.shared.counters.snapshot()
    }
}

/// Radio event router
pub struct RadioRouter {
    shared: Arc<Shared>,
    network: ZigbeeNetworkConfig,
    init_timeout: Duration,
    workers: usize,
    queue_depth: usize,
    enqueue_timeout: Duration,
}

impl RadioRouter {
    /// Create a router over `transport`
    pub fn new(
        config: &GatewayConfig,
        transport: Arc<dyn RadioTransport>,
        registry: Arc<dyn DeviceRegistry>,
        catalog: Arc<SchemaCatalog>,
        settings: ConfigStore,
    ) -> (Self, RouterHandle) {
        let shared = Arc::new(Shared {
            transport,
            registry,
            catalog,
            codec: ZclCodec::new(),
            settings,
            events: EventChannels::new(config.router.queue_depth),
            counters: Counters::default(),
            query_timeout: config.radio.query_timeout,
        });

        let router = Self {
            shared: shared.clone(),
            network: config.network.clone(),
            init_timeout: config.radio.init_timeout,
            workers: config.router.workers.max(1),
            queue_depth: config.router.queue_depth.max(1),
            enqueue_timeout: config.router.enqueue_timeout,
        };

        (router, RouterHandle { shared })
    }

    /// Another handle to this router
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            shared: self.shared.clone(),
        }
    }

    /// Bring the radio up
    ///
    /// Seeds the transport with the persisted devices, configures the
    /// network, applies the current join policy and registers the gateway
    /// endpoint. The whole sequence is bounded by the init timeout. Returns
    /// the coordinator's node record, which is also published on the
    /// adapter channel.
    pub async fn initialise(&self) -> Result<Device> {
        let limit = self.init_timeout;
        let adapter = tokio::time::timeout(limit, self.initialise_steps())
            .await
            .map_err(|_| RadioError::InitFailed(format!("timed out after {}s", limit.as_secs())))??;

        self.shared.events.publish_adapter(adapter.clone());
        Ok(adapter)
    }

    async fn initialise_steps(&self) -> Result<Device> {
        let shared = &self.shared;

        let known = shared.registry.get_all().await?;
        info!(
            transport = shared.transport.name(),
            devices = known.len(),
            channel = self.network.channel,
            pan_id = self.network.pan_id,
            "Initialising radio"
        );

        let adapter = shared.transport.initialise(&self.network, known).await?;

        let permit = shared.settings.current().settings.permit_join;
        shared.transport.set_join_policy(permit).await?;
        shared
            .transport
            .register_endpoint(EndpointRegistration::gateway())
            .await?;

        info!(
            ieee = %adapter.ieee_address,
            nwk = adapter.network_address,
            permit_join = permit,
            "Radio initialised"
        );
        Ok(adapter)
    }

    /// Run the event loop until `shutdown` fires or the transport closes
    ///
    /// On exit the worker queues are drained and the transport is stopped.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!(
            transport = self.shared.transport.name(),
            workers = self.workers,
            queue_depth = self.queue_depth,
            "Starting radio event router"
        );

        let (senders, workers) = self.spawn_workers();

        let outcome = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Radio router shutdown requested");
                    break Ok(());
                }

                event = self.shared.transport.read_event() => match event {
                    Ok(Some(event)) => self.dispatch(&senders, event).await,
                    Ok(None) => {
                        warn!("Radio transport closed its event stream");
                        break Err(RadioError::ChannelClosed);
                    }
                    Err(e) if e.is_retriable() => {
                        Counters::bump(&self.shared.counters.read_errors);
                        warn!(error = %e, code = e.error_code(), "Error reading radio event");
                        tokio::select! {
                            _ = shutdown.cancelled() => break Ok(()),
                            _ = tokio::time::sleep(READ_ERROR_BACKOFF) => {}
                        }
                    }
                    Err(e) => {
                        error!(error = %e, code = e.error_code(), "Radio transport failed");
                        break Err(e);
                    }
                }
            }
        };

        // Closing the queues lets workers finish what they hold, then exit
        drop(senders);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                warn!(error = %e, "Router worker ended abnormally");
            }
        }

        if let Err(e) = self.shared.transport.stop().await {
            warn!(error = %e, "Error stopping radio transport");
        }

        let stats = self.shared.counters.snapshot();
        info!(
            received = stats.events_received,
            dropped = stats.events_dropped,
            published = stats.messages_published,
            "Radio event router stopped"
        );
        outcome
    }

    fn spawn_workers(&self) -> (Vec<mpsc::Sender<RadioEvent>>, Vec<JoinHandle<()>>) {
        (0..self.workers)
            .map(|index| {
                let (tx, mut rx) = mpsc::channel(self.queue_depth);
                let shared = self.shared.clone();
                let handle = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        shared.handle_event(event).await;
                    }
                    trace!(worker = index, "Router worker stopped");
                });
                (tx, handle)
            })
            .unzip()
    }

    async fn dispatch(&self, senders: &[mpsc::Sender<RadioEvent>], event: RadioEvent) {
        Counters::bump(&self.shared.counters.events_received);

        let address = event.address();
        let shard = (address.as_u64() % senders.len() as u64) as usize;
        trace!(ieee = %address, kind = event.kind(), shard, "Dispatching radio event");

        match senders[shard].send_timeout(event, self.enqueue_timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(event)) => {
                Counters::bump(&self.shared.counters.events_dropped);
                warn!(ieee = %address, kind = event.kind(), shard, "Router worker queue full, dropping event");
            }
            Err(SendTimeoutError::Closed(event)) => {
                Counters::bump(&self.shared.counters.events_dropped);
                warn!(ieee = %address, kind = event.kind(), shard, "Router worker gone, dropping event");
            }
        }
    }
}

// ============================================================================
// Inbound events
// ============================================================================

impl Shared {
    async fn handle_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::NodeJoin { node } => {
                info!(ieee = %node.ieee_address, nwk = node.network_address, "Device joined");
                self.save(&node).await;
                self.events.publish_join(node);
            }
            RadioEvent::NodeUpdate { node } => {
                debug!(ieee = %node.ieee_address, nwk = node.network_address, "Device updated");
                self.save(&node).await;
                self.events.publish_update(node);
            }
            RadioEvent::NodeLeave { node } => {
                // The record stays; the device may rejoin
                info!(ieee = %node.ieee_address, "Device left");
                self.events.publish_leave(node);
            }
            RadioEvent::IncomingMessage {
                mut node,
                link_quality,
                message,
            } => {
                node.touch(link_quality);
                self.save(&node).await;
                self.handle_message(node.ieee_address, link_quality, &message);
            }
        }
    }

    async fn save(&self, device: &Device) {
        if let Err(e) = self.registry.save(device).await {
            Counters::bump(&self.counters.registry_errors);
            warn!(
                ieee = %device.ieee_address,
                error = %e,
                code = e.error_code(),
                "Failed to save device"
            );
        }
    }

    fn handle_message(&self, address: IeeeAddress, link_quality: u8, message: &ApplicationMessage) {
        let cluster_id = message.cluster_id;

        let frame = match self.codec.decode(cluster_id, &message.data) {
            Ok(frame) => frame,
            Err(e) => {
                Counters::bump(&self.counters.decode_errors);
                warn!(
                    ieee = %address,
                    cluster = cluster_id,
                    error = %e,
                    code = e.error_code(),
                    "Failed to decode application message"
                );
                return;
            }
        };

        let body = match frame.command {
            ZclCommand::ReportAttributes(report) => DeviceMessageBody::AttributeReport(
                self.attribute_report(
                    cluster_id,
                    report.records.into_iter().map(|r| (r.identifier, r.value)),
                ),
            ),
            ZclCommand::ReadAttributesResponse(response) => {
                let values = response.records.into_iter().filter_map(|r| {
                    if r.status != status::SUCCESS {
                        debug!(
                            ieee = %address,
                            cluster = cluster_id,
                            attribute = r.identifier,
                            status = r.status,
                            "Attribute read failed"
                        );
                        return None;
                    }
                    r.value.map(|value| (r.identifier, value))
                });
                DeviceMessageBody::ReadResponse(self.attribute_report(cluster_id, values))
            }
            ZclCommand::DefaultResponse(response) => DeviceMessageBody::DefaultResponse {
                cluster_id,
                command_identifier: response.command_identifier,
                status: response.status,
            },
            ZclCommand::Local(LocalCommand::ZoneStatusChangeNotification(notification)) => {
                DeviceMessageBody::ZoneStatusChange {
                    cluster_id,
                    cluster_name: self.catalog.lookup(cluster_id).name.clone(),
                    notification,
                }
            }
            other => {
                Counters::bump(&self.counters.messages_ignored);
                debug!(
                    ieee = %address,
                    cluster = cluster_id,
                    command = other.name(),
                    "Ignoring unhandled command"
                );
                return;
            }
        };

        Counters::bump(&self.counters.messages_published);
        self.events.publish_message(DeviceMessage {
            ieee_address: address,
            link_quality,
            message: body,
        });
    }

    fn attribute_report(
        &self,
        cluster_id: u16,
        values: impl IntoIterator<Item = (u16, AttributeValue)>,
    ) -> AttributeReport {
        let descriptor = self.catalog.lookup(cluster_id);
        if descriptor.is_empty() {
            debug!(cluster = cluster_id, "Cluster not in schema");
        }

        AttributeReport {
            cluster_id,
            cluster_name: descriptor.name.clone(),
            attributes: values
                .into_iter()
                .map(|(id, value)| (attribute_key(descriptor, id), value))
                .collect(),
        }
    }
}

/// Output key for an attribute: its schema name, else `0x` + four hex digits
fn attribute_key(descriptor: &ClusterDescriptor, id: u16) -> String {
    match descriptor.attribute(id) {
        Some(attribute) if !attribute.name.is_empty() => attribute.name.clone(),
        _ => format!("{:#06x}", id),
    }
}

// ============================================================================
// Outbound commands
// ============================================================================

impl Shared {
    async fn execute(&self, command: DeviceCommand) -> Result<()> {
        match command {
            DeviceCommand::SendCommand {
                address,
                cluster_id,
                endpoint,
                command_identifier,
                parameters,
            } => {
                self.send_command(address, cluster_id, endpoint, command_identifier, &parameters)
                    .await
            }
            DeviceCommand::GetAttributes {
                address,
                cluster_id,
                endpoint,
                attributes,
            } => self.get_attributes(address, cluster_id, endpoint, attributes).await,
            DeviceCommand::WriteAttributes {
                address,
                cluster_id,
                endpoint,
                attributes,
            } => self.write_attributes(address, cluster_id, endpoint, &attributes).await,
            DeviceCommand::ExploreDevice { address } => self.explore(address).await,
            DeviceCommand::SetJoinPolicy { permit } => self.set_join_policy(permit).await,
        }
    }

    async fn send_command(
        &self,
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        command_id: u8,
        parameters: &Map<String, Value>,
    ) -> Result<()> {
        let mut command = self
            .codec
            .local_command(cluster_id, Direction::ClientToServer, command_id)
            .ok_or(RadioError::UnsupportedCommand {
                cluster_id,
                command_id,
            })?;

        let applied = FieldSetter::apply(&mut command, parameters)?;
        trace!(command = command.name(), applied, "Populated command fields");

        self.send_frame(address, cluster_id, endpoint, ZclCommand::Local(command))
            .await
    }

    async fn get_attributes(
        &self,
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        attributes: Vec<u16>,
    ) -> Result<()> {
        if attributes.is_empty() {
            return Err(RadioError::InvalidCommand("no attributes requested".into()));
        }

        let command = ZclCommand::ReadAttributes(ReadAttributes {
            identifiers: attributes,
        });
        self.send_frame(address, cluster_id, endpoint, command).await
    }

    async fn write_attributes(
        &self,
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        attributes: &Map<String, Value>,
    ) -> Result<()> {
        let descriptor = self.catalog.lookup(cluster_id);
        let mut records = Vec::with_capacity(attributes.len());

        for (key, value) in attributes {
            let Some(attribute) = resolve_attribute(descriptor, key) else {
                warn!(ieee = %address, cluster = cluster_id, attribute = %key, "Unknown attribute, skipping");
                continue;
            };

            match AttributeValue::from_json(attribute.data_type, &attribute.name, value)? {
                Some(value) => records.push(AttributeRecord {
                    identifier: attribute.id,
                    data_type: attribute.data_type,
                    value,
                }),
                None => debug!(
                    attribute = %attribute.name,
                    data_type = %attribute.data_type,
                    "Value kind not accepted by attribute type, skipping"
                ),
            }
        }

        if records.is_empty() {
            return Err(RadioError::InvalidCommand(format!(
                "no writable attributes for cluster 0x{:04x}",
                cluster_id
            )));
        }

        self.send_frame(
            address,
            cluster_id,
            endpoint,
            ZclCommand::WriteAttributes(WriteAttributes { records }),
        )
        .await
    }

    async fn send_frame(
        &self,
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        command: ZclCommand,
    ) -> Result<()> {
        let frame = self.codec.frame(command);
        let data = self.codec.encode(&frame)?;

        debug!(
            ieee = %address,
            cluster = cluster_id,
            endpoint,
            command = frame.command.name(),
            seq = frame.header.transaction_sequence,
            "Sending frame"
        );

        let message = ApplicationMessage {
            cluster_id,
            profile_id: PROFILE_HOME_AUTOMATION,
            source_endpoint: GATEWAY_ENDPOINT,
            destination_endpoint: endpoint,
            data,
        };
        self.transport
            .send_application_message(address, message, REQUIRE_ACK)
            .await
    }

    async fn explore(&self, address: IeeeAddress) -> Result<()> {
        let limit = self.query_timeout;
        let transport = &self.transport;

        let node = bounded(
            "query_node_description",
            limit,
            transport.query_node_description(address),
        )
        .await?;
        let endpoints = bounded(
            "query_node_endpoints",
            limit,
            transport.query_node_endpoints(address),
        )
        .await?;

        let mut descriptions = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            match bounded(
                "query_node_endpoint_description",
                limit,
                transport.query_node_endpoint_description(address, endpoint),
            )
            .await
            {
                Ok(description) => descriptions.push(description),
                Err(e) => warn!(ieee = %address, endpoint, error = %e, "Skipping endpoint"),
            }
        }

        info!(
            ieee = %address,
            logical_type = %node.logical_type,
            endpoints = descriptions.len(),
            "Explored device"
        );

        self.events.publish_description(DeviceDescription {
            ieee_address: address,
            logical_type: node.logical_type,
            manufacturer_code: node.manufacturer_code,
            endpoints: descriptions,
        });
        Ok(())
    }

    async fn set_join_policy(&self, permit: bool) -> Result<()> {
        let current = self.settings.current();
        if current.settings.permit_join == permit {
            debug!(permit, version = current.version, "Join policy unchanged");
            return Ok(());
        }

        self.transport.set_join_policy(permit).await?;

        let snapshot = self.settings.update(|settings| {
            let mut next = settings.clone();
            next.permit_join = permit;
            next
        });
        info!(permit, version = snapshot.version, "Join policy changed");
        Ok(())
    }
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    request: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::time::timeout(limit, request)
        .await
        .map_err(|_| RadioError::timeout(operation, limit))?
}

/// Find an attribute by schema name, or by numeric ID in decimal or `0x` hex
fn resolve_attribute<'a>(descriptor: &'a ClusterDescriptor, key: &str) -> Option<&'a AttributeDescriptor> {
    descriptor
        .attribute_by_name(key)
        .or_else(|| parse_attribute_id(key).and_then(|id| descriptor.attribute(id)))
}

fn parse_attribute_id(key: &str) -> Option<u16> {
    match key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => key.parse().ok(),
    }
}
