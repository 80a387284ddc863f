//! Hardware addresses and node roles
//!
//! Zigbee nodes are identified by a vendor-assigned 64-bit IEEE address that
//! never changes across rejoins. On the bus the address is rendered as a
//! zero-padded hex string (`0x00124b000724ae04`), which is also the form
//! accepted in topics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 64-bit globally unique hardware address of a mesh node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "AddressRepr", into = "String")]
pub struct IeeeAddress(pub u64);

impl IeeeAddress {
    /// Get the raw 64-bit value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl FromStr for IeeeAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || digits.len() > 16 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }

        u64::from_str_radix(digits, 16)
            .map(IeeeAddress)
            .map_err(|_| CoreError::InvalidAddress(s.to_string()))
    }
}

impl From<u64> for IeeeAddress {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<IeeeAddress> for u64 {
    fn from(addr: IeeeAddress) -> Self {
        addr.0
    }
}

impl From<IeeeAddress> for String {
    fn from(addr: IeeeAddress) -> Self {
        addr.to_string()
    }
}

/// Accepts both the hex string form and a bare JSON number
#[derive(Deserialize)]
#[serde(untagged)]
enum AddressRepr {
    Text(String),
    Number(u64),
}

impl TryFrom<AddressRepr> for IeeeAddress {
    type Error = CoreError;

    fn try_from(repr: AddressRepr) -> Result<Self, Self::Error> {
        match repr {
            AddressRepr::Text(s) => s.parse(),
            AddressRepr::Number(n) => Ok(IeeeAddress(n)),
        }
    }
}

/// Logical role of a node within the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalType {
    /// Network coordinator (the gateway's own radio)
    Coordinator,
    /// Mains-powered routing node
    Router,
    /// Sleepy or non-routing leaf node
    EndDevice,
    /// Role not reported
    Unknown,
}

impl From<u8> for LogicalType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Coordinator,
            0x01 => Self::Router,
            0x02 => Self::EndDevice,
            _ => Self::Unknown,
        }
    }
}

impl From<LogicalType> for u8 {
    fn from(value: LogicalType) -> Self {
        match value {
            LogicalType::Coordinator => 0x00,
            LogicalType::Router => 0x01,
            LogicalType::EndDevice => 0x02,
            LogicalType::Unknown => 0xff,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Coordinator => write!(f, "coordinator"),
            LogicalType::Router => write!(f, "router"),
            LogicalType::EndDevice => write!(f, "end_device"),
            LogicalType::Unknown => write!(f, "unknown"),
        }
    }
}
