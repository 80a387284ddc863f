//! Meshgate Zigbee - Radio side of the gateway
//!
//! This crate turns the radio coprocessor's event stream into normalized
//! device events and carries normalized commands back to the mesh.
//!
//! ## Components
//!
//! - **transport**: the [`RadioTransport`] contract and the TCP driver client
//! - **router**: [`RadioRouter`], the event loop and command executor
//! - **events**: normalized outbound events and their broadcast channels
//! - **commands**: normalized inbound commands
//! - **test_utils**: [`MockRadio`] for tests
//! - **error**: Radio-specific error types
//!
//! ## Event Flow
//!
//! ```text
//! transport.read_event()
//!     │
//!     ├─ NodeJoin / NodeUpdate ──► registry.save ──► joins / updates
//!     ├─ NodeLeave ──────────────────────────────► leaves
//!     └─ IncomingMessage ──► registry.save ──► decode ──► messages
//! ```

pub mod commands;
pub mod error;
pub mod events;
pub mod router;
pub mod test_utils;
pub mod transport;

// Re-exports for convenience
pub use commands::DeviceCommand;
pub use error::{RadioError, Result};
pub use events::{AttributeReport, DeviceDescription, DeviceMessage, DeviceMessageBody, EventChannels};
pub use router::{RadioRouter, RouterHandle, RouterStats};
pub use test_utils::{MockRadio, SentMessage};
pub use transport::{
    EndpointDescription, EndpointRegistration, NodeDescription, RadioEvent, RadioTransport,
};

#[cfg(feature = "tcp")]
pub use transport::TcpRadioTransport;
