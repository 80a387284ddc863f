//! SQLite device store
//!
//! One row per device. Every `save` is committed before it returns, so the
//! store is durable per write. Addresses are stored as the bit pattern of
//! the 64-bit value in a signed `INTEGER` column and timestamps as Unix
//! milliseconds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshgate_core::{Device, IeeeAddress, LogicalType};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Result, StateError};
use crate::registry::DeviceRegistry;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    ieee_address     INTEGER PRIMARY KEY NOT NULL,
    network_address  INTEGER NOT NULL,
    logical_type     INTEGER NOT NULL,
    link_quality     INTEGER NOT NULL,
    depth            INTEGER NOT NULL,
    last_discovered  INTEGER NOT NULL,
    last_received    INTEGER NOT NULL
)
"#;

const UPSERT: &str = r#"
INSERT INTO devices
    (ieee_address, network_address, logical_type, link_quality, depth, last_discovered, last_received)
VALUES (?, ?, ?, ?, ?, ?, ?)
ON CONFLICT(ieee_address) DO UPDATE SET
    network_address = excluded.network_address,
    logical_type    = excluded.logical_type,
    link_quality    = excluded.link_quality,
    depth           = excluded.depth,
    last_discovered = excluded.last_discovered,
    last_received   = excluded.last_received
"#;

const SELECT_COLUMNS: &str = "SELECT ieee_address, network_address, logical_type, link_quality, \
     depth, last_discovered, last_received FROM devices";

/// Device registry backed by a SQLite database file
pub struct SqliteDeviceStore {
    pool: SqlitePool,
    // SQLite allows one writer; serializing here avoids busy retries
    write_lock: Mutex<()>,
}

impl SqliteDeviceStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        sqlx::query(SCHEMA).execute(&pool).await?;

        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }
}

fn address_to_db(address: IeeeAddress) -> i64 {
    address.as_u64() as i64
}

fn millis_to_time(column: &str, millis: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StateError::InvalidData(format!("{} out of range: {}", column, millis)))
}

fn narrow<T: TryFrom<i64>>(column: &str, value: i64) -> Result<T> {
    T::try_from(value)
        .map_err(|_| StateError::InvalidData(format!("{} out of range: {}", column, value)))
}

fn row_to_device(row: &SqliteRow) -> Result<Device> {
    let ieee: i64 = row.try_get("ieee_address")?;
    let logical_type: i64 = row.try_get("logical_type")?;

    Ok(Device {
        ieee_address: IeeeAddress(ieee as u64),
        network_address: narrow("network_address", row.try_get("network_address")?)?,
        logical_type: LogicalType::from(narrow::<u8>("logical_type", logical_type)?),
        link_quality: narrow("link_quality", row.try_get("link_quality")?)?,
        depth: narrow("depth", row.try_get("depth")?)?,
        last_discovered: millis_to_time("last_discovered", row.try_get("last_discovered")?)?,
        last_received: millis_to_time("last_received", row.try_get("last_received")?)?,
    })
}

#[async_trait]
impl DeviceRegistry for SqliteDeviceStore {
    async fn get_all(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query(SELECT_COLUMNS).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_device).collect()
    }

    async fn get(&self, address: IeeeAddress) -> Result<Device> {
        let query = format!("{} WHERE ieee_address = ?", SELECT_COLUMNS);
        let row = sqlx::query(&query)
            .bind(address_to_db(address))
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_device(&row),
            None => Err(StateError::device_not_found(address)),
        }
    }

    async fn save(&self, device: &Device) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query(UPSERT)
            .bind(address_to_db(device.ieee_address))
            .bind(i64::from(device.network_address))
            .bind(i64::from(u8::from(device.logical_type)))
            .bind(i64::from(device.link_quality))
            .bind(i64::from(device.depth))
            .bind(device.last_discovered.timestamp_millis())
            .bind(device.last_received.timestamp_millis())
            .execute(&self.pool)
            .await?;

        debug!(ieee = %device.ieee_address, "Saved device");
        Ok(())
    }

    async fn delete(&self, address: IeeeAddress) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM devices WHERE ieee_address = ?")
            .bind(address_to_db(address))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.pool.close().await;
        Ok(())
    }
}
