//! Persisted device record
//!
//! One record per hardware address. Everything except the address is
//! volatile and is overwritten on every join, update or message event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::{IeeeAddress, LogicalType};

/// A known mesh node as stored in the device registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Hardware address (registry key)
    pub ieee_address: IeeeAddress,
    /// Current 16-bit network (short) address
    pub network_address: u16,
    /// Logical role in the mesh
    pub logical_type: LogicalType,
    /// Link quality indicator of the last contact
    pub link_quality: u8,
    /// Depth in the mesh tree
    pub depth: u8,
    /// When the node was last discovered (join/announce)
    pub last_discovered: DateTime<Utc>,
    /// When a frame was last received from the node
    pub last_received: DateTime<Utc>,
}

impl Device {
    /// Create a record for a freshly seen node
    pub fn new(ieee_address: IeeeAddress, network_address: u16) -> Self {
        let now = Utc::now();
        Self {
            ieee_address,
            network_address,
            logical_type: LogicalType::Unknown,
            link_quality: 0,
            depth: 0,
            last_discovered: now,
            last_received: now,
        }
    }

    /// Set the logical role
    pub fn with_logical_type(mut self, logical_type: LogicalType) -> Self {
        self.logical_type = logical_type;
        self
    }

    /// Set the link quality indicator
    pub fn with_link_quality(mut self, link_quality: u8) -> Self {
        self.link_quality = link_quality;
        self
    }

    /// Set the mesh depth
    pub fn with_depth(mut self, depth: u8) -> Self {
        self.depth = depth;
        self
    }

    /// Refresh the last-received timestamp and link quality from traffic
    pub fn touch(&mut self, link_quality: u8) {
        self.last_received = Utc::now();
        self.link_quality = link_quality;
    }
}
