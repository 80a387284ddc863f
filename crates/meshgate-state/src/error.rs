//! Error types for the device registry

use thiserror::Error;

/// Errors that can occur in registry operations
#[derive(Error, Debug)]
pub enum StateError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Record not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Stored data could not be turned back into a record
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Could not open the backing store
    #[error("Connection error: {0}")]
    Connection(String),

    /// File system error
    #[error("IO error: {0}")]
    Io(String),

    /// Operation after `close()`
    #[error("Registry is closed")]
    Closed,
}

impl StateError {
    /// Build a not-found error for a device address
    pub fn device_not_found(address: impl ToString) -> Self {
        StateError::NotFound {
            entity: "device".to_string(),
            id: address.to_string(),
        }
    }

    /// Check if this is a missing-record error
    pub fn is_not_found(&self) -> bool {
        matches!(self, StateError::NotFound { .. })
    }

    /// Check if retrying the operation may succeed
    pub fn is_retriable(&self) -> bool {
        matches!(self, StateError::Database(_) | StateError::Io(_))
    }

    /// Get an error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            StateError::Database(_) => "DATABASE",
            StateError::NotFound { .. } => "NOT_FOUND",
            StateError::Serialization(_) => "SERIALIZATION",
            StateError::InvalidData(_) => "INVALID_DATA",
            StateError::Connection(_) => "CONNECTION",
            StateError::Io(_) => "IO_ERROR",
            StateError::Closed => "CLOSED",
        }
    }
}

impl From<sqlx::Error> for StateError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StateError::NotFound {
                entity: "record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolClosed => StateError::Closed,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StateError::InvalidData(err.to_string())
            }
            _ => StateError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        StateError::Io(err.to_string())
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found() {
        let err = StateError::device_not_found("0x0000000000000001");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "device not found: 0x0000000000000001");
    }

    #[test]
    fn test_sqlx_conversion() {
        assert!(StateError::from(sqlx::Error::RowNotFound).is_not_found());
        assert!(matches!(StateError::from(sqlx::Error::PoolClosed), StateError::Closed));
    }
}
