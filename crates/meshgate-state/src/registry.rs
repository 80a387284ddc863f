//! Device registry contract and backend selection

use async_trait::async_trait;
use meshgate_core::{Device, IeeeAddress, RegistryBackend, RegistryConfig};
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::snapshot::SnapshotDeviceStore;
use crate::sqlite::SqliteDeviceStore;

/// Persistent set of known devices keyed by hardware address
///
/// Implementations are internally synchronized; callers share one instance
/// across tasks and never lock around it.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Point-in-time snapshot of every record, in no particular order
    async fn get_all(&self) -> Result<Vec<Device>>;

    /// One record, or [`StateError::NotFound`](crate::StateError::NotFound)
    async fn get(&self, address: IeeeAddress) -> Result<Device>;

    /// Insert or replace the record for `device.ieee_address`
    async fn save(&self, device: &Device) -> Result<()>;

    /// Remove a record; absent addresses are not an error
    async fn delete(&self, address: IeeeAddress) -> Result<()>;

    /// Flush pending writes and release storage
    async fn close(&self) -> Result<()>;
}

/// Open the backend selected by `config`
pub async fn open_registry(config: &RegistryConfig) -> Result<Arc<dyn DeviceRegistry>> {
    let registry: Arc<dyn DeviceRegistry> = match config.backend {
        RegistryBackend::Sqlite => Arc::new(SqliteDeviceStore::open(&config.path).await?),
        RegistryBackend::Snapshot => Arc::new(
            SnapshotDeviceStore::open(config.path.clone(), config.flush_interval).await?,
        ),
    };

    info!(
        backend = ?config.backend,
        path = %config.path.display(),
        "Device registry opened"
    );

    Ok(registry)
}
