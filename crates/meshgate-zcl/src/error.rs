//! Error types for cluster library operations

use thiserror::Error;

/// Main error type for schema loading, frame coding and field population
#[derive(Error, Debug)]
pub enum ZclError {
    // ===== Catalog Errors =====
    /// Schema source does not exist
    #[error("Schema file not found: {0}")]
    CatalogNotFound(String),

    /// Schema source is not valid
    #[error("Failed to parse schema: {0}")]
    CatalogParse(String),

    // ===== Frame Errors =====
    /// Payload ended before a complete value was read
    #[error("Truncated payload: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Bytes required by the next value
        needed: usize,
        /// Bytes left in the buffer
        remaining: usize,
    },

    /// Frame header is malformed
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Attribute data type has no codec
    #[error("Unsupported data type: 0x{0:02x}")]
    UnsupportedDataType(u8),

    // ===== Field Population Errors =====
    /// Value does not fit the destination field
    #[error("Value {value} out of range for field {field}")]
    FieldOutOfRange {
        /// Destination field name
        field: String,
        /// Offending value as received
        value: String,
    },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZclError {
    /// Check if this is a protocol error (bad data from a device)
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ZclError::Truncated { .. } | ZclError::InvalidFrame(_) | ZclError::UnsupportedDataType(_)
        )
    }

    /// Check if this error was caused by a bus client's request
    pub fn is_client_error(&self) -> bool {
        matches!(self, ZclError::FieldOutOfRange { .. })
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            ZclError::CatalogNotFound(_) => "CATALOG_NOT_FOUND",
            ZclError::CatalogParse(_) => "CATALOG_PARSE",
            ZclError::Truncated { .. } => "TRUNCATED",
            ZclError::InvalidFrame(_) => "INVALID_FRAME",
            ZclError::UnsupportedDataType(_) => "UNSUPPORTED_DATA_TYPE",
            ZclError::FieldOutOfRange { .. } => "FIELD_OUT_OF_RANGE",
            ZclError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias for cluster library operations
pub type Result<T> = std::result::Result<T, ZclError>;

impl From<serde_json::Error> for ZclError {
    fn from(err: serde_json::Error) -> Self {
        ZclError::CatalogParse(err.to_string())
    }
}
