//! Error types for the message bus side

use meshgate_state::StateError;
use meshgate_zigbee::RadioError;
use thiserror::Error;

/// Main error type for bus client and bus routing operations
#[derive(Error, Debug)]
pub enum BusError {
    // ===== Client Errors =====
    /// Broker connection failed or dropped
    #[error("Bus connection error: {0}")]
    Connection(String),

    /// Publication could not be queued
    #[error("Publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic
        topic: String,
        /// Failure reason
        reason: String,
    },

    /// Bus client is gone
    #[error("Channel closed")]
    ChannelClosed,

    // ===== Request Errors =====
    /// Topic does not name a known route
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Topic names a device address that does not parse
    #[error("Invalid device address in topic: {0}")]
    InvalidAddress(String),

    /// Message body does not match the route
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // ===== Wrapped Errors =====
    /// Radio router error
    #[error(transparent)]
    Radio(#[from] RadioError),

    /// Device registry error
    #[error(transparent)]
    State(#[from] StateError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BusError {
    /// Check if the operation may succeed when retried
    pub fn is_retriable(&self) -> bool {
        match self {
            BusError::Connection(_) | BusError::Publish { .. } => true,
            BusError::Radio(e) => e.is_retriable(),
            BusError::State(e) => e.is_retriable(),
            _ => false,
        }
    }

    /// Check if this error was caused by the inbound message itself
    pub fn is_client_error(&self) -> bool {
        match self {
            BusError::InvalidTopic(_) | BusError::InvalidAddress(_) | BusError::InvalidPayload(_) => true,
            BusError::Radio(e) => e.is_client_error(),
            _ => false,
        }
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            BusError::Connection(_) => "CONNECTION_ERROR",
            BusError::Publish { .. } => "PUBLISH_FAILED",
            BusError::ChannelClosed => "CHANNEL_CLOSED",
            BusError::InvalidTopic(_) => "INVALID_TOPIC",
            BusError::InvalidAddress(_) => "INVALID_ADDRESS",
            BusError::InvalidPayload(_) => "INVALID_PAYLOAD",
            BusError::Radio(e) => e.error_code(),
            BusError::State(e) => e.error_code(),
            BusError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;
