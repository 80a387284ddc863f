//! In-memory bus for tests
//!
//! [`MemoryBus`] records every publication and hands out a sender that
//! plays the broker's part for inbound messages.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::client::{BusClient, BusMessage};
use crate::error::{BusError, Result};

/// A publication captured by [`MemoryBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
}

impl Publication {
    /// Decode the payload as JSON
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.payload).unwrap_or(serde_json::Value::Null)
    }
}

/// Bus client that keeps publications in memory
pub struct MemoryBus {
    published: Mutex<Vec<Publication>>,
    tx: mpsc::UnboundedSender<Publication>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Publication>>,
    fail: AtomicBool,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            published: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            fail: AtomicBool::new(false),
        }
    }

    /// Channel for feeding inbound messages to a bus router
    pub fn inbound(capacity: usize) -> (mpsc::Sender<BusMessage>, mpsc::Receiver<BusMessage>) {
        mpsc::channel(capacity)
    }

    /// Make every publish fail
    pub fn fail_publishes(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Everything published so far
    pub fn published(&self) -> Vec<Publication> {
        self.published.lock().clone()
    }

    /// Wait for the next publication on `topic`, skipping others
    pub async fn wait_for(&self, topic: &str, timeout: Duration) -> Option<Publication> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(timeout, async {
            while let Some(publication) = rx.recv().await {
                if publication.topic == topic {
                    return Some(publication);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }
}

#[async_trait]
impl BusClient for MemoryBus {
    async fn publish(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BusError::Publish {
                topic,
                reason: "broker unavailable".into(),
            });
        }

        let publication = Publication {
            topic,
            payload,
            retain,
        };
        self.published.lock().push(publication.clone());
        let _ = self.tx.send(publication);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
