//! Normalized inbound commands

use meshgate_core::IeeeAddress;
use serde_json::{Map, Value};

/// A request for the radio router
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCommand {
    /// Send a cluster-specific command built from loosely typed parameters
    SendCommand {
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        command_identifier: u8,
        parameters: Map<String, Value>,
    },
    /// Read attributes by numeric ID
    GetAttributes {
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        attributes: Vec<u16>,
    },
    /// Write attributes named by schema name or numeric ID
    WriteAttributes {
        address: IeeeAddress,
        cluster_id: u16,
        endpoint: u8,
        attributes: Map<String, Value>,
    },
    /// Query descriptor, endpoints and endpoint descriptions
    ExploreDevice { address: IeeeAddress },
    /// Permit or deny joining
    SetJoinPolicy { permit: bool },
}

impl DeviceCommand {
    /// Target device, if the command addresses one
    pub fn address(&self) -> Option<IeeeAddress> {
        match self {
            DeviceCommand::SendCommand { address, .. }
            | DeviceCommand::GetAttributes { address, .. }
            | DeviceCommand::WriteAttributes { address, .. }
            | DeviceCommand::ExploreDevice { address } => Some(*address),
            DeviceCommand::SetJoinPolicy { .. } => None,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            DeviceCommand::SendCommand { .. } => "send_command",
            DeviceCommand::GetAttributes { .. } => "get_attributes",
            DeviceCommand::WriteAttributes { .. } => "write_attributes",
            DeviceCommand::ExploreDevice { .. } => "explore_device",
            DeviceCommand::SetJoinPolicy { .. } => "set_join_policy",
        }
    }
}
