//! Meshgate State - Device registry persistence
//!
//! This crate stores the set of known mesh devices across restarts.
//!
//! ## Components
//!
//! - **registry**: the [`DeviceRegistry`] contract and backend selection
//! - **sqlite**: SQLite backend with sqlx, durable on every write
//! - **snapshot**: in-memory backend flushed periodically to a JSON file
//! - **error**: State-specific error types
//!
//! ## Example
//!
//! ```ignore
//! use meshgate_core::{Device, IeeeAddress, RegistryConfig};
//! use meshgate_state::open_registry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = open_registry(&RegistryConfig::default()).await?;
//!     registry.save(&Device::new(IeeeAddress(0x00124b000724ae04), 0x1a2b)).await?;
//!     println!("{} devices", registry.get_all().await?.len());
//!     registry.close().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod registry;
pub mod snapshot;
pub mod sqlite;

// Re-exports for convenience
pub use error::{Result, StateError};
pub use registry::{open_registry, DeviceRegistry};
pub use snapshot::SnapshotDeviceStore;
pub use sqlite::SqliteDeviceStore;
