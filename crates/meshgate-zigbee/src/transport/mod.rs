//! Radio transport contract
//!
//! The coprocessor driver lives outside the gateway. The router only sees
//! this trait: a source of [`RadioEvent`]s and a sink for application
//! messages and network management requests.
//!
//! - [`tcp::TcpRadioTransport`] - JSON lines over TCP to a driver process (requires `tcp` feature)
//! - [`crate::test_utils::MockRadio`] - scriptable in-memory transport for tests

#[cfg(feature = "tcp")]
mod tcp;
#[cfg(feature = "tcp")]
pub use tcp::TcpRadioTransport;

use async_trait::async_trait;
use meshgate_core::{Device, IeeeAddress, LogicalType, ZigbeeNetworkConfig};
use meshgate_zcl::{ApplicationMessage, GATEWAY_ENDPOINT, PROFILE_HOME_AUTOMATION};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An event read from the radio
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RadioEvent {
    /// A node joined the network
    NodeJoin { node: Device },
    /// A node left the network
    NodeLeave { node: Device },
    /// The transport refreshed what it knows about a node
    NodeUpdate { node: Device },
    /// An application message arrived from a node
    IncomingMessage {
        node: Device,
        link_quality: u8,
        message: ApplicationMessage,
    },
}

impl RadioEvent {
    /// Hardware address of the node the event concerns
    pub fn address(&self) -> IeeeAddress {
        match self {
            RadioEvent::NodeJoin { node }
            | RadioEvent::NodeLeave { node }
            | RadioEvent::NodeUpdate { node }
            | RadioEvent::IncomingMessage { node, .. } => node.ieee_address,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            RadioEvent::NodeJoin { .. } => "join",
            RadioEvent::NodeLeave { .. } => "leave",
            RadioEvent::NodeUpdate { .. } => "update",
            RadioEvent::IncomingMessage { .. } => "message",
        }
    }
}

/// Node descriptor query result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescription {
    pub logical_type: LogicalType,
    pub manufacturer_code: u16,
}

/// Simple descriptor of one endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    #[serde(default)]
    pub in_cluster_list: Vec<u16>,
    #[serde(default)]
    pub out_cluster_list: Vec<u16>,
}

/// Local endpoint registered with the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRegistration {
    pub endpoint: u8,
    pub profile_id: u16,
    pub device_id: u16,
    pub device_version: u8,
    pub in_clusters: Vec<u16>,
    pub out_clusters: Vec<u16>,
}

impl EndpointRegistration {
    /// The single home automation endpoint all outbound traffic uses
    pub fn gateway() -> Self {
        Self {
            endpoint: GATEWAY_ENDPOINT,
            profile_id: PROFILE_HOME_AUTOMATION,
            device_id: 1,
            device_version: 1,
            in_clusters: Vec::new(),
            out_clusters: Vec::new(),
        }
    }
}

/// Connection to the radio coprocessor
///
/// Methods take `&self`; implementations serialize access internally so
/// the router may issue requests concurrently with an outstanding
/// [`read_event`](RadioTransport::read_event).
#[async_trait]
pub trait RadioTransport: Send + Sync {
    /// Form or resume the network and seed the address cache
    ///
    /// Returns the coordinator's own node record.
    async fn initialise(&self, network: &ZigbeeNetworkConfig, known: Vec<Device>) -> Result<Device>;

    /// Permit or deny new nodes joining
    async fn set_join_policy(&self, permit: bool) -> Result<()>;

    /// Register a local application endpoint
    async fn register_endpoint(&self, registration: EndpointRegistration) -> Result<()>;

    /// Next event from the radio
    ///
    /// Returns `None` once the transport has shut down. Must be cancel safe.
    async fn read_event(&self) -> Result<Option<RadioEvent>>;

    /// Send an application message to a node
    async fn send_application_message(
        &self,
        address: IeeeAddress,
        message: ApplicationMessage,
        require_ack: bool,
    ) -> Result<()>;

    /// Query a node's descriptor
    async fn query_node_description(&self, address: IeeeAddress) -> Result<NodeDescription>;

    /// Query the active endpoints of a node
    async fn query_node_endpoints(&self, address: IeeeAddress) -> Result<Vec<u8>>;

    /// Query the simple descriptor of one endpoint
    async fn query_node_endpoint_description(
        &self,
        address: IeeeAddress,
        endpoint: u8,
    ) -> Result<EndpointDescription>;

    /// Stop the transport
    async fn stop(&self) -> Result<()>;

    /// Transport name for logs
    fn name(&self) -> &str;
}
