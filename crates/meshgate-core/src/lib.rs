//! Meshgate Core - Foundational types shared by every gateway component
//!
//! This crate holds the vocabulary the rest of the workspace speaks:
//!
//! - [`address`] - Hardware (IEEE) addresses and logical node roles
//! - [`device`] - The persisted device record
//! - [`config`] - Gateway configuration file and the versioned runtime settings store
//! - [`error`] - Core error types
//!
//! # Example
//!
//! ```rust
//! use meshgate_core::{IeeeAddress, LogicalType};
//!
//! let addr: IeeeAddress = "0x00124b000724ae04".parse().unwrap();
//! assert_eq!(addr.to_string(), "0x00124b000724ae04");
//! assert_eq!(LogicalType::from(2u8), LogicalType::EndDevice);
//! ```

pub mod address;
pub mod config;
pub mod device;
pub mod error;

pub use address::{IeeeAddress, LogicalType};
pub use config::{
    ConfigStore, GatewayConfig, GatewaySettings, MqttConfig, RadioConfig, RegistryBackend,
    RegistryConfig, RouterConfig, SettingsSnapshot, ZigbeeNetworkConfig,
};
pub use device::Device;
pub use error::{CoreError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(VERSION.contains('.'), "VERSION should be semver format");
    }
}
