//! Topic layout and inbound request parsing
//!
//! Every topic lives under the configured root:
//!
//! ```text
//! <root>/gateway/get_devices         -> <root>/gateway/devices
//! <root>/gateway/get_config          -> <root>/gateway/config
//! <root>/gateway/set_config          {permit_join}
//! <root>/gateway/remove_device       {ieee_address}
//! <root>/<hex-address>/get           {cluster_id, endpoint, attributes: [id]}
//! <root>/<hex-address>/set           {cluster_id, endpoint, command_identifier, command_data}
//! <root>/<hex-address>/write         {cluster_id, endpoint, attributes: {name: value}}
//! <root>/<hex-address>/explore
//! ```
//!
//! Body fields accept both snake_case and the PascalCase names used by
//! existing clients (`ClusterID`, `CommandData`, ...).

use meshgate_core::IeeeAddress;
use meshgate_zigbee::DeviceCommand;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{BusError, Result};

/// Path segment reserved for administrative topics
pub const GATEWAY_SEGMENT: &str = "gateway";

/// Endpoint used when a request body names none
const DEFAULT_ENDPOINT: u8 = 1;

/// Builder for every topic the gateway publishes or subscribes to
#[derive(Debug, Clone)]
pub struct Topics {
    root: String,
}

impl Topics {
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Subscription filter covering every inbound topic
    pub fn subscription(&self) -> String {
        format!("{}/#", self.root)
    }

    /// Plain device messages
    pub fn device(&self, address: IeeeAddress) -> String {
        format!("{}/{}", self.root, address)
    }

    /// Device events with a kind suffix (`description`, `join`, ...)
    pub fn device_event(&self, address: IeeeAddress, kind: &str) -> String {
        format!("{}/{}/{}", self.root, address, kind)
    }

    /// Administrative topics
    pub fn gateway(&self, name: &str) -> String {
        format!("{}/{}/{}", self.root, GATEWAY_SEGMENT, name)
    }

    /// Retained online/offline marker
    pub fn status(&self) -> String {
        self.gateway("status")
    }
}

/// A parsed inbound request
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Forward to the radio router
    Device(DeviceCommand),
    /// Publish the registry snapshot
    GetDevices,
    /// Publish the runtime settings
    GetConfig,
    /// Change the join policy, then publish the settings
    SetConfig { permit_join: bool },
    /// Drop a registry record, then publish the registry snapshot
    RemoveDevice { address: IeeeAddress },
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Device(command) => command.name(),
            Request::GetDevices => "get_devices",
            Request::GetConfig => "get_config",
            Request::SetConfig { .. } => "set_config",
            Request::RemoveDevice { .. } => "remove_device",
        }
    }
}

// ============================================================================
// Request bodies
// ============================================================================

fn default_endpoint() -> u8 {
    DEFAULT_ENDPOINT
}

#[derive(Debug, Deserialize)]
struct GetBody {
    #[serde(alias = "ClusterID")]
    cluster_id: u16,
    #[serde(alias = "Endpoint", default = "default_endpoint")]
    endpoint: u8,
    #[serde(alias = "Attributes")]
    attributes: Vec<u16>,
}

#[derive(Debug, Deserialize)]
struct SetBody {
    #[serde(alias = "ClusterID")]
    cluster_id: u16,
    #[serde(alias = "Endpoint", default = "default_endpoint")]
    endpoint: u8,
    #[serde(alias = "CommandIdentifier")]
    command_identifier: u8,
    #[serde(alias = "CommandData", default)]
    command_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WriteBody {
    #[serde(alias = "ClusterID")]
    cluster_id: u16,
    #[serde(alias = "Endpoint", default = "default_endpoint")]
    endpoint: u8,
    #[serde(alias = "Attributes")]
    attributes: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ConfigBody {
    #[serde(alias = "PermitJoin")]
    permit_join: bool,
}

#[derive(Debug, Deserialize)]
struct RemoveBody {
    #[serde(alias = "IEEEAddress")]
    ieee_address: IeeeAddress,
}

fn body<T: DeserializeOwned>(payload: &[u8]) -> Result<T> {
    serde_json::from_slice(payload).map_err(|e| BusError::InvalidPayload(e.to_string()))
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse an inbound message into a request
///
/// Topics outside `root`, with fewer than two segments below it, or with an
/// unknown verb are [`BusError::InvalidTopic`]. The body is only decoded
/// once the route is known.
pub fn parse_request(root: &str, topic: &str, payload: &[u8]) -> Result<Request> {
    let rest = topic
        .strip_prefix(root)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| BusError::InvalidTopic(topic.to_string()))?;

    let segments: Vec<&str> = rest.split('/').collect();
    let &[target, verb] = segments.as_slice() else {
        return Err(BusError::InvalidTopic(topic.to_string()));
    };

    if target == GATEWAY_SEGMENT {
        return parse_admin(topic, verb, payload);
    }

    let address: IeeeAddress = target
        .parse()
        .map_err(|_| BusError::InvalidAddress(target.to_string()))?;

    let command = match verb {
        "get" => {
            let GetBody {
                cluster_id,
                endpoint,
                attributes,
            } = body(payload)?;
            DeviceCommand::GetAttributes {
                address,
                cluster_id,
                endpoint,
                attributes,
            }
        }
        "set" => {
            let SetBody {
                cluster_id,
                endpoint,
                command_identifier,
                command_data,
            } = body(payload)?;
            DeviceCommand::SendCommand {
                address,
                cluster_id,
                endpoint,
                command_identifier,
                parameters: command_data,
            }
        }
        "write" => {
            let WriteBody {
                cluster_id,
                endpoint,
                attributes,
            } = body(payload)?;
            DeviceCommand::WriteAttributes {
                address,
                cluster_id,
                endpoint,
                attributes,
            }
        }
        "explore" => DeviceCommand::ExploreDevice { address },
        _ => return Err(BusError::InvalidTopic(topic.to_string())),
    };

    Ok(Request::Device(command))
}

fn parse_admin(topic: &str, verb: &str, payload: &[u8]) -> Result<Request> {
    match verb {
        "get_devices" => Ok(Request::GetDevices),
        "get_config" => Ok(Request::GetConfig),
        "set_config" => {
            let ConfigBody { permit_join } = body(payload)?;
            Ok(Request::SetConfig { permit_join })
        }
        "remove_device" => {
            let RemoveBody { ieee_address } = body(payload)?;
            Ok(Request::RemoveDevice {
                address: ieee_address,
            })
        }
        _ => Err(BusError::InvalidTopic(topic.to_string())),
    }
}
