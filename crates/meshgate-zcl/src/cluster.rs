//! Cluster identifiers and frame-level enumerations

use serde::{Deserialize, Serialize};

/// Common cluster IDs
pub mod id {
    // General
    pub const BASIC: u16 = 0x0000;
    pub const POWER_CONFIG: u16 = 0x0001;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;

    // Lighting
    pub const COLOR_CONTROL: u16 = 0x0300;

    // Measurement
    pub const ILLUMINANCE_MEASUREMENT: u16 = 0x0400;
    pub const TEMPERATURE_MEASUREMENT: u16 = 0x0402;
    pub const PRESSURE_MEASUREMENT: u16 = 0x0403;
    pub const HUMIDITY_MEASUREMENT: u16 = 0x0405;
    pub const OCCUPANCY_SENSING: u16 = 0x0406;

    // Security
    pub const IAS_ZONE: u16 = 0x0500;
    pub const IAS_WD: u16 = 0x0502;

    // Smart energy
    pub const METERING: u16 = 0x0702;
    pub const ELECTRICAL_MEASUREMENT: u16 = 0x0B04;
}

/// Home automation application profile
pub const PROFILE_HOME_AUTOMATION: u16 = 0x0104;

/// Endpoint the gateway uses for all of its own traffic
pub const GATEWAY_ENDPOINT: u8 = 0x01;

/// Frame type (bits 0-1 of the frame control field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameType {
    /// Command acts across the entire profile
    Global = 0x00,
    /// Command is specific to a cluster
    ClusterSpecific = 0x01,
}

/// Command direction (bit 3 of the frame control field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Direction {
    /// Sent from the client side of a cluster to the server side
    ClientToServer = 0x00,
    /// Sent from the server side of a cluster to the client side
    ServerToClient = 0x01,
}

/// Global (profile-wide) command identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GlobalCommandId {
    ReadAttributes = 0x00,
    ReadAttributesResponse = 0x01,
    WriteAttributes = 0x02,
    WriteAttributesUndivided = 0x03,
    WriteAttributesResponse = 0x04,
    WriteAttributesNoResponse = 0x05,
    ConfigureReporting = 0x06,
    ConfigureReportingResponse = 0x07,
    ReadReportingConfig = 0x08,
    ReadReportingConfigResponse = 0x09,
    ReportAttributes = 0x0A,
    DefaultResponse = 0x0B,
    DiscoverAttributes = 0x0C,
    DiscoverAttributesResponse = 0x0D,
}

impl TryFrom<u8> for GlobalCommandId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0x00 => Self::ReadAttributes,
            0x01 => Self::ReadAttributesResponse,
            0x02 => Self::WriteAttributes,
            0x03 => Self::WriteAttributesUndivided,
            0x04 => Self::WriteAttributesResponse,
            0x05 => Self::WriteAttributesNoResponse,
            0x06 => Self::ConfigureReporting,
            0x07 => Self::ConfigureReportingResponse,
            0x08 => Self::ReadReportingConfig,
            0x09 => Self::ReadReportingConfigResponse,
            0x0A => Self::ReportAttributes,
            0x0B => Self::DefaultResponse,
            0x0C => Self::DiscoverAttributes,
            0x0D => Self::DiscoverAttributesResponse,
            other => return Err(other),
        })
    }
}

/// Status code carried by responses
pub mod status {
    pub const SUCCESS: u8 = 0x00;
    pub const FAILURE: u8 = 0x01;
    pub const UNSUP_CLUSTER_COMMAND: u8 = 0x81;
    pub const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
    pub const INVALID_VALUE: u8 = 0x87;
    pub const READ_ONLY: u8 = 0x88;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_command_ids() {
        assert_eq!(
            GlobalCommandId::try_from(0x0A),
            Ok(GlobalCommandId::ReportAttributes)
        );
        assert_eq!(GlobalCommandId::DefaultResponse as u8, 0x0B);
        assert_eq!(GlobalCommandId::try_from(0x42), Err(0x42));
    }
}
