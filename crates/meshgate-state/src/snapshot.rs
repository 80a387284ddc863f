//! In-memory device store with periodic JSON snapshots
//!
//! Reads and writes hit a map guarded by a read/write lock. A background
//! task writes the whole map to disk every flush interval when something
//! changed, and `close()` performs a final flush. A crash between flushes
//! loses the unflushed upserts; devices report again on their next
//! activity.
//!
//! The snapshot is written to a sibling temporary file and renamed over
//! the previous one so a crash mid-write never leaves a truncated file.

use async_trait::async_trait;
use meshgate_core::{Device, IeeeAddress};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, StateError};
use crate::registry::DeviceRegistry;

struct Inner {
    devices: RwLock<HashMap<IeeeAddress, Device>>,
    path: Option<PathBuf>,
    dirty: AtomicBool,
    closed: AtomicBool,
    flush_lock: Mutex<()>,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StateError::Closed);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.flush_lock.lock().await;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let mut devices: Vec<Device> = self.devices.read().values().cloned().collect();
        devices.sort_by_key(|d| d.ieee_address);

        let result = async {
            let json = serde_json::to_vec_pretty(&devices)?;
            let tmp = path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, path).await?;
            Ok::<_, StateError>(())
        }
        .await;

        match result {
            Ok(()) => {
                debug!(path = %path.display(), devices = devices.len(), "Flushed device snapshot");
                Ok(())
            }
            Err(e) => {
                // Keep the changes pending for the next attempt
                self.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }
}

/// Device registry held in memory and flushed to a JSON file
pub struct SnapshotDeviceStore {
    inner: Arc<Inner>,
    shutdown: CancellationToken,
    flusher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl SnapshotDeviceStore {
    /// Open a store persisted at `path`, loading any existing snapshot
    pub async fn open(path: PathBuf, flush_interval: Duration) -> Result<Self> {
        let devices = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let list: Vec<Device> = serde_json::from_slice(&bytes)
                    .map_err(|e| StateError::InvalidData(format!("{}: {}", path.display(), e)))?;
                list.into_iter().map(|d| (d.ieee_address, d)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        let store = Self::with_state(devices, Some(path));
        store.spawn_flusher(flush_interval);
        Ok(store)
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self::with_state(HashMap::new(), None)
    }

    fn with_state(devices: HashMap<IeeeAddress, Device>, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                devices: RwLock::new(devices),
                path,
                dirty: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
            }),
            shutdown: CancellationToken::new(),
            flusher: parking_lot::Mutex::new(None),
        }
    }

    fn spawn_flusher(&self, flush_interval: Duration) {
        let inner = self.inner.clone();
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(flush_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inner.flush().await {
                            warn!(error = %e, code = e.error_code(), "Periodic snapshot flush failed");
                        }
                    }
                }
            }
        });

        *self.flusher.lock() = Some(handle);
    }

    /// Write pending changes now
    pub async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

#[async_trait]
impl DeviceRegistry for SnapshotDeviceStore {
    async fn get_all(&self) -> Result<Vec<Device>> {
        self.inner.ensure_open()?;
        Ok(self.inner.devices.read().values().cloned().collect())
    }

    async fn get(&self, address: IeeeAddress) -> Result<Device> {
        self.inner.ensure_open()?;
        self.inner
            .devices
            .read()
            .get(&address)
            .cloned()
            .ok_or_else(|| StateError::device_not_found(address))
    }

    async fn save(&self, device: &Device) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner
            .devices
            .write()
            .insert(device.ieee_address, device.clone());
        self.inner.dirty.store(true, Ordering::Release);
        Ok(())
    }

    async fn delete(&self, address: IeeeAddress) -> Result<()> {
        self.inner.ensure_open()?;
        if self.inner.devices.write().remove(&address).is_some() {
            self.inner.dirty.store(true, Ordering::Release);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shutdown.cancel();
        let handle = self.flusher.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Snapshot flusher task ended abnormally");
            }
        }

        self.inner.flush().await
    }
}

impl Drop for SnapshotDeviceStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = SnapshotDeviceStore::in_memory();
        store.save(&Device::new(IeeeAddress(7), 1)).await.unwrap();
        assert_eq!(store.get(IeeeAddress(7)).await.unwrap().network_address, 1);
        store.close().await.unwrap();
        assert!(matches!(store.get_all().await, Err(StateError::Closed)));
    }

    #[tokio::test]
    async fn test_periodic_flush_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        let store = SnapshotDeviceStore::open(path.clone(), Duration::from_millis(50))
            .await
            .unwrap();

        store.save(&Device::new(IeeeAddress(1), 2)).await.unwrap();

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(path.exists());

        let on_disk: Vec<Device> = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.len(), 1);

        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_is_invalid_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("devices.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = SnapshotDeviceStore::open(path, Duration::from_secs(30))
            .await
            .err()
            .unwrap();
        assert_eq!(err.error_code(), "INVALID_DATA");
    }
}
