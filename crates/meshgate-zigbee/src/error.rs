//! Error types for radio routing
//!
//! Covers the radio transport, outbound command handling and the
//! per-event failures the router logs and survives.

use meshgate_state::StateError;
use meshgate_zcl::ZclError;
use thiserror::Error;

/// Main error type for radio transport and routing operations
#[derive(Error, Debug)]
pub enum RadioError {
    // ===== Transport Errors =====
    /// The transport rejected or failed a request
    #[error("Radio transport error: {0}")]
    Transport(String),

    /// A bounded request did not complete in time
    #[error("{operation} timed out after {duration_ms}ms")]
    Timeout {
        /// What was being waited on
        operation: String,
        /// Bound that elapsed, in milliseconds
        duration_ms: u64,
    },

    /// Initialisation sequence failed
    #[error("Radio initialisation failed: {0}")]
    InitFailed(String),

    /// Transport or router channel is gone
    #[error("Channel closed")]
    ChannelClosed,

    // ===== Command Errors =====
    /// No typed command is registered for the tuple
    #[error("Command 0x{command_id:02x} on cluster 0x{cluster_id:04x} is not supported")]
    UnsupportedCommand {
        /// Cluster ID
        cluster_id: u16,
        /// Cluster-specific command ID
        command_id: u8,
    },

    /// Request could not be turned into a frame
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // ===== Wrapped Errors =====
    /// Cluster library error
    #[error(transparent)]
    Zcl(#[from] ZclError),

    /// Device registry error
    #[error(transparent)]
    State(#[from] StateError),

    /// Serialization error on the transport wire
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RadioError {
    /// Build a timeout error
    pub fn timeout(operation: impl Into<String>, duration: std::time::Duration) -> Self {
        RadioError::Timeout {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Check if the operation may succeed when retried
    pub fn is_retriable(&self) -> bool {
        match self {
            RadioError::Transport(_) | RadioError::Timeout { .. } | RadioError::Io(_) => true,
            RadioError::State(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Check if this error stems from malformed mesh traffic
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, RadioError::Zcl(e) if e.is_protocol_error())
    }

    /// Check if this error was caused by the request itself
    pub fn is_client_error(&self) -> bool {
        match self {
            RadioError::UnsupportedCommand { .. } | RadioError::InvalidCommand(_) => true,
            RadioError::Zcl(e) => e.is_client_error(),
            _ => false,
        }
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            RadioError::Transport(_) => "TRANSPORT_ERROR",
            RadioError::Timeout { .. } => "TIMEOUT",
            RadioError::InitFailed(_) => "INIT_FAILED",
            RadioError::ChannelClosed => "CHANNEL_CLOSED",
            RadioError::UnsupportedCommand { .. } => "UNSUPPORTED_COMMAND",
            RadioError::InvalidCommand(_) => "INVALID_COMMAND",
            RadioError::Zcl(e) => e.error_code(),
            RadioError::State(e) => e.error_code(),
            RadioError::Serialization(_) => "SERIALIZATION_ERROR",
            RadioError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for radio operations
pub type Result<T> = std::result::Result<T, RadioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_unsupported_command_display() {
        let err = RadioError::UnsupportedCommand {
            cluster_id: 0xfc00,
            command_id: 0x10,
        };
        assert_eq!(err.to_string(), "Command 0x10 on cluster 0xfc00 is not supported");
        assert!(err.is_client_error());
        assert!(!err.is_retriable());
        assert_eq!(err.error_code(), "UNSUPPORTED_COMMAND");
    }

    #[test]
    fn test_timeout_is_retriable() {
        let err = RadioError::timeout("query_node_endpoints", Duration::from_secs(60));
        assert!(err.is_retriable());
        assert_eq!(err.to_string(), "query_node_endpoints timed out after 60000ms");
    }

    #[test]
    fn test_wrapped_codes_pass_through() {
        let err = RadioError::from(ZclError::InvalidFrame("short".into()));
        assert!(err.is_protocol_error());
        assert_eq!(err.error_code(), "INVALID_FRAME");
    }
}
