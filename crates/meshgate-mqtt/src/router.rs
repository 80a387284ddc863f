//! Bus router
//!
//! Connects the message bus to the radio router in both directions.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────────────────────────┐
//!   bus inbound ─►│ BusRouter::run                         │
//!                 │   semaphore ──► spawn handle(message)  │──► RouterHandle::execute
//!                 │                                        │──► DeviceRegistry
//!                 ├────────────────────────────────────────┤
//!                 │ forwarder task                         │
//!                 │   broadcast receivers ──► publish      │
//!                 └────────────────────────────────────────┘
//!                        ▲                        │
//!            EventChannels (radio)           BusClient::publish
//! ```
//!
//! Inbound handlers run concurrently, at most `max_inflight_bus_messages`
//! at a time. Intake waits for a free slot rather than dropping. Outbound
//! events are published by their own task, in arrival order per event kind,
//! and never wait on inbound handling.

use meshgate_core::{ConfigStore, Device, GatewayConfig};
use meshgate_state::DeviceRegistry;
use meshgate_zigbee::{DeviceCommand, DeviceDescription, DeviceMessage, RouterHandle};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::{BusClient, BusMessage};
use crate::error::{BusError, Result};
use crate::topic::{parse_request, Request, Topics};

/// Time allowed for in-flight handlers to finish after shutdown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Statistics for the bus router
#[derive(Debug, Clone, Default)]
pub struct BusStats {
    /// Inbound messages accepted for handling
    pub messages_received: u64,
    /// Inbound messages dropped as unparseable
    pub messages_dropped: u64,
    /// Publications handed to the bus client
    pub published: u64,
    /// Publications that failed to serialize or send
    pub publish_errors: u64,
    /// Outbound events missed because a receiver lagged
    pub events_lagged: u64,
}

#[derive(Default)]
struct Counters {
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
    published: AtomicU64,
    publish_errors: AtomicU64,
    events_lagged: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> BusStats {
        BusStats {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            events_lagged: self.events_lagged.load(Ordering::Relaxed),
        }
    }
}

/// State shared by the run loop and every handler task
struct Context {
    bus: Arc<dyn BusClient>,
    radio: RouterHandle,
    registry: Arc<dyn DeviceRegistry>,
    settings: ConfigStore,
    topics: Topics,
    counters: Counters,
}

/// Receivers for every radio event kind
struct Subscriptions {
    messages: broadcast::Receiver<DeviceMessage>,
    descriptions: broadcast::Receiver<DeviceDescription>,
    joins: broadcast::Receiver<Device>,
    leaves: broadcast::Receiver<Device>,
    updates: broadcast::Receiver<Device>,
    adapter: broadcast::Receiver<Device>,
}

/// Bus router
pub struct BusRouter {
    context: Arc<Context>,
    subscriptions: Subscriptions,
    inflight: Arc<Semaphore>,
    max_inflight: usize,
}

impl BusRouter {
    /// Create a bus router and subscribe to every radio event kind
    ///
    /// Subscriptions start here, so events emitted between construction and
    /// [`run`](Self::run) (for example the adapter record published during
    /// radio initialisation) are not missed.
    pub fn new(
        config: &GatewayConfig,
        bus: Arc<dyn BusClient>,
        radio: RouterHandle,
        registry: Arc<dyn DeviceRegistry>,
        settings: ConfigStore,
    ) -> Self {
        let events = radio.events();
        let subscriptions = Subscriptions {
            messages: events.subscribe_messages(),
            descriptions: events.subscribe_descriptions(),
            joins: events.subscribe_joins(),
            leaves: events.subscribe_leaves(),
            updates: events.subscribe_updates(),
            adapter: events.subscribe_adapter(),
        };

        let max_inflight = config.router.max_inflight_bus_messages;

        Self {
            context: Arc::new(Context {
                bus,
                radio,
                registry,
                settings,
                topics: Topics::new(&config.mqtt.root_topic),
                counters: Counters::default(),
            }),
            subscriptions,
            inflight: Arc::new(Semaphore::new(max_inflight)),
            max_inflight,
        }
    }

    /// Get router statistics
    pub fn stats(&self) -> BusStats {
        self.context.counters.snapshot()
    }

    /// Run until `shutdown` is cancelled or the inbound stream ends
    ///
    /// Radio events are forwarded by a separate task, so a full set of busy
    /// handlers delays only the next inbound message, never publication.
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<BusMessage>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let Self {
            context,
            subscriptions,
            inflight,
            max_inflight,
        } = self;

        info!(
            bus = context.bus.name(),
            root = context.topics.root(),
            max_inflight,
            "Bus router started"
        );

        let forwarding = shutdown.child_token();
        let forwarder = tokio::spawn(Arc::clone(&context).forward(subscriptions, forwarding.clone()));

        let result = loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    debug!("Bus router received shutdown signal");
                    break Ok(());
                }

                message = inbound.recv() => match message {
                    Some(message) => {
                        let permit = tokio::select! {
                            _ = shutdown.cancelled() => break Ok(()),
                            permit = inflight.clone().acquire_owned() => permit,
                        };
                        let Ok(permit) = permit else {
                            break Err(BusError::ChannelClosed);
                        };

                        Counters::bump(&context.counters.messages_received);
                        let context = Arc::clone(&context);
                        tokio::spawn(async move {
                            context.handle(message).await;
                            drop(permit);
                        });
                    }
                    None => {
                        warn!("Bus inbound stream closed");
                        break Err(BusError::ChannelClosed);
                    }
                },
            }
        };

        forwarding.cancel();
        if let Err(e) = forwarder.await {
            warn!(error = %e, "Bus event forwarder ended abnormally");
        }

        // Let in-flight handlers finish; holding every permit means none remain
        let limit = u32::try_from(max_inflight).unwrap_or(u32::MAX);
        if tokio::time::timeout(DRAIN_TIMEOUT, inflight.acquire_many(limit))
            .await
            .is_err()
        {
            warn!(timeout = ?DRAIN_TIMEOUT, "Bus handlers still running at shutdown");
        }

        let stats = context.counters.snapshot();
        info!(
            received = stats.messages_received,
            dropped = stats.messages_dropped,
            published = stats.published,
            publish_errors = stats.publish_errors,
            lagged = stats.events_lagged,
            "Bus router stopped"
        );

        result
    }
}

impl Context {
    /// Publish radio events until `shutdown` fires
    async fn forward(self: Arc<Self>, mut subs: Subscriptions, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                result = subs.messages.recv() => {
                    if let Some(message) = self.received(result, "message") {
                        let topic = self.topics.device(message.ieee_address);
                        self.publish_json(topic, &message).await;
                    }
                }

                result = subs.descriptions.recv() => {
                    if let Some(description) = self.received(result, "description") {
                        let topic = self.topics.device_event(description.ieee_address, "description");
                        self.publish_json(topic, &description).await;
                    }
                }

                result = subs.joins.recv() => {
                    if let Some(device) = self.received(result, "join") {
                        self.publish_device_event(&device, "join").await;
                    }
                }

                result = subs.leaves.recv() => {
                    if let Some(device) = self.received(result, "leave") {
                        self.publish_device_event(&device, "leave").await;
                    }
                }

                result = subs.updates.recv() => {
                    if let Some(device) = self.received(result, "update") {
                        self.publish_device_event(&device, "update").await;
                    }
                }

                result = subs.adapter.recv() => {
                    if let Some(device) = self.received(result, "adapter") {
                        let topic = self.topics.gateway("adapter");
                        self.publish_json(topic, &device).await;
                    }
                }
            }
        }

        trace!("Bus event forwarder stopped");
    }

    /// Handle one inbound message; failures are logged, never returned
    async fn handle(&self, message: BusMessage) {
        let request = match parse_request(self.topics.root(), &message.topic, &message.payload) {
            Ok(request) => request,
            Err(BusError::InvalidTopic(_)) => {
                Counters::bump(&self.counters.messages_dropped);
                debug!(topic = %message.topic, "Ignoring message on unrouted topic");
                return;
            }
            Err(e) => {
                Counters::bump(&self.counters.messages_dropped);
                warn!(
                    topic = %message.topic,
                    error = %e,
                    code = e.error_code(),
                    "Dropping malformed bus message"
                );
                return;
            }
        };

        trace!(topic = %message.topic, request = request.name(), "Routing bus message");

        match request {
            // The radio router logs command failures
            Request::Device(command) => {
                let _ = self.radio.execute(command).await;
            }
            Request::GetDevices => self.publish_devices().await,
            Request::GetConfig => self.publish_config().await,
            Request::SetConfig { permit_join } => {
                let _ = self
                    .radio
                    .execute(DeviceCommand::SetJoinPolicy {
                        permit: permit_join,
                    })
                    .await;
                self.publish_config().await;
            }
            Request::RemoveDevice { address } => {
                match self.registry.delete(address).await {
                    Ok(()) => info!(ieee = %address, "Device removed from registry"),
                    Err(e) => warn!(
                        ieee = %address,
                        error = %e,
                        code = e.error_code(),
                        "Failed to remove device"
                    ),
                }
                self.publish_devices().await;
            }
        }
    }

    async fn publish_devices(&self) {
        match self.registry.get_all().await {
            Ok(devices) => {
                let topic = self.topics.gateway("devices");
                self.publish_json(topic, &devices).await;
            }
            Err(e) => {
                Counters::bump(&self.counters.publish_errors);
                warn!(error = %e, code = e.error_code(), "Failed to read device registry");
            }
        }
    }

    async fn publish_config(&self) {
        let snapshot = self.settings.current();
        let topic = self.topics.gateway("config");
        self.publish_json(topic, snapshot.settings.as_ref()).await;
    }

    async fn publish_device_event(&self, device: &Device, kind: &str) {
        let topic = self.topics.device_event(device.ieee_address, kind);
        self.publish_json(topic, device).await;
    }

    /// Serialize and publish; failures are logged and the publication skipped
    async fn publish_json<T: Serialize + ?Sized>(&self, topic: String, value: &T) {
        let payload = match serde_json::to_vec(value) {
            Ok(payload) => payload,
            Err(e) => {
                Counters::bump(&self.counters.publish_errors);
                warn!(topic = %topic, error = %e, "Failed to serialize bus payload");
                return;
            }
        };

        match self.bus.publish(topic.clone(), payload, false).await {
            Ok(()) => {
                Counters::bump(&self.counters.published);
                trace!(topic = %topic, "Published");
            }
            Err(e) => {
                Counters::bump(&self.counters.publish_errors);
                warn!(topic = %topic, error = %e, code = e.error_code(), "Publish failed");
            }
        }
    }

    fn received<T>(&self, result: std::result::Result<T, RecvError>, kind: &'static str) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(RecvError::Lagged(missed)) => {
                self.counters.events_lagged.fetch_add(missed, Ordering::Relaxed);
                warn!(kind, missed, "Bus router lagged behind radio events");
                None
            }
            Err(RecvError::Closed) => None,
        }
    }
}
