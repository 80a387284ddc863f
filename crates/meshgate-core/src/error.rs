//! Error types for core gateway types
//!
//! Address parsing and configuration loading are the only fallible
//! operations at this layer; both are surfaced at startup or at the
//! edge of the bus router.

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Hardware address could not be parsed
    #[error("Invalid IEEE address: {0}")]
    InvalidAddress(String),

    /// Configuration file does not exist
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::InvalidAddress(_) => "INVALID_ADDRESS",
            CoreError::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            CoreError::ConfigParse(_) => "CONFIG_PARSE",
            CoreError::InvalidConfig(_) => "INVALID_CONFIG",
            CoreError::Io(_) => "IO_ERROR",
        }
    }

    /// Check if this error was caused by bad operator input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CoreError::InvalidAddress(_) | CoreError::ConfigParse(_) | CoreError::InvalidConfig(_)
        )
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::ConfigParse(err.to_string())
    }
}
