//! Meshgate MQTT - Message bus side of the gateway
//!
//! This crate carries normalized device events from the radio router to an
//! MQTT broker and turns inbound bus messages into radio commands and
//! registry queries.
//!
//! ## Components
//!
//! - **client**: the [`BusClient`] contract and [`BusMessage`]
//! - **mqtt**: [`MqttBusClient`], the rumqttc-backed client
//! - **memory**: [`MemoryBus`] for tests
//! - **topic**: topic layout and [`parse_request`]
//! - **router**: [`BusRouter`]
//! - **error**: Bus-specific error types
//!
//! ## Example
//!
//! ```ignore
//! let shutdown = CancellationToken::new();
//! let (bus, inbound, mqtt_task) = MqttBusClient::start(&config.mqtt, shutdown.clone());
//! let router = BusRouter::new(&config, bus, radio.handle(), registry, settings);
//! router.run(inbound, shutdown).await?;
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod mqtt;
pub mod router;
pub mod topic;

// Re-exports for convenience
pub use client::{BusClient, BusMessage};
pub use error::{BusError, Result};
pub use memory::{MemoryBus, Publication};
pub use mqtt::MqttBusClient;
pub use router::{BusRouter, BusStats};
pub use topic::{parse_request, Request, Topics};
