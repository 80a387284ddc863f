//! Registry contract tests, run against every backend

use chrono::Utc;
use meshgate_core::{Device, IeeeAddress, LogicalType};
use meshgate_state::{DeviceRegistry, SnapshotDeviceStore, SqliteDeviceStore};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Clone, Copy, Debug)]
enum Backend {
    Sqlite,
    Snapshot,
}

const BACKENDS: [Backend; 2] = [Backend::Sqlite, Backend::Snapshot];

async fn open(backend: Backend, dir: &Path) -> Arc<dyn DeviceRegistry> {
    match backend {
        Backend::Sqlite => Arc::new(SqliteDeviceStore::open(dir.join("devices.db")).await.unwrap()),
        Backend::Snapshot => Arc::new(
            SnapshotDeviceStore::open(dir.join("devices.json"), Duration::from_secs(3600))
                .await
                .unwrap(),
        ),
    }
}

fn device(addr: u64, network_address: u16) -> Device {
    Device::new(IeeeAddress(addr), network_address)
}

// ============================================================================
// Upsert
// ============================================================================

#[tokio::test]
async fn test_save_twice_keeps_one_record_with_second_fields() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let registry = open(backend, dir.path()).await;

        registry.save(&device(0xa1, 0x0001)).await.unwrap();
        let second = device(0xa1, 0x0002)
            .with_logical_type(LogicalType::Router)
            .with_link_quality(180)
            .with_depth(3);
        registry.save(&second).await.unwrap();

        let all = registry.get_all().await.unwrap();
        assert_eq!(all.len(), 1, "{:?}", backend);

        let stored = registry.get(IeeeAddress(0xa1)).await.unwrap();
        assert_eq!(stored.network_address, 0x0002);
        assert_eq!(stored.logical_type, LogicalType::Router);
        assert_eq!(stored.link_quality, 180);
        assert_eq!(stored.depth, 3);

        registry.close().await.unwrap();
    }
}

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_get_all_tracks_saves_and_deletes() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let registry = open(backend, dir.path()).await;

        for addr in 1..=5u64 {
            registry.save(&device(addr, addr as u16)).await.unwrap();
        }
        registry.delete(IeeeAddress(2)).await.unwrap();
        registry.delete(IeeeAddress(4)).await.unwrap();
        // absent address is a no-op
        registry.delete(IeeeAddress(99)).await.unwrap();

        let members: HashSet<u64> = registry
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.ieee_address.as_u64())
            .collect();
        assert_eq!(members, HashSet::from([1, 3, 5]), "{:?}", backend);

        assert!(registry.get(IeeeAddress(2)).await.unwrap_err().is_not_found());

        registry.close().await.unwrap();
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_saves_lose_nothing() {
    const N: u64 = 64;

    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let registry = open(backend, dir.path()).await;

        let tasks: Vec<_> = (0..N)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.save(&device(0x1000 + i, i as u16)).await })
            })
            .collect();

        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        assert_eq!(registry.get_all().await.unwrap().len(), N as usize, "{:?}", backend);
        registry.close().await.unwrap();
    }
}

// ============================================================================
// Durability
// ============================================================================

#[tokio::test]
async fn test_records_survive_close_and_reopen() {
    for backend in BACKENDS {
        let dir = TempDir::new().unwrap();
        let before = Utc::now();

        {
            let registry = open(backend, dir.path()).await;
            registry.save(&device(0x00124b000724ae04, 0x7a2b)).await.unwrap();
            registry.save(&device(0x00124b0001020304, 0x0042)).await.unwrap();
            registry.delete(IeeeAddress(0x00124b0001020304)).await.unwrap();
            registry.close().await.unwrap();
        }

        let reopened = open(backend, dir.path()).await;
        let all = reopened.get_all().await.unwrap();
        assert_eq!(all.len(), 1, "{:?}", backend);
        assert_eq!(all[0].ieee_address, IeeeAddress(0x00124b000724ae04));
        assert_eq!(all[0].network_address, 0x7a2b);
        assert!(all[0].last_received.timestamp_millis() >= before.timestamp_millis());

        reopened.close().await.unwrap();
    }
}
