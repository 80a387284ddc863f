//! Bus client contract

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A message received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BusMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Outbound side of a bus connection
///
/// Inbound messages are delivered separately, through the channel returned
/// when the client is started, so one client can be shared by every
/// publishing task.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish `payload` on `topic`
    async fn publish(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<()>;

    /// Client name for logs
    fn name(&self) -> &str;
}
