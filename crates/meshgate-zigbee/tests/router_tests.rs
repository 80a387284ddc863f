//! Radio router tests against the mock transport

use bytes::Bytes;
use chrono::Utc;
use meshgate_core::{ConfigStore, Device, GatewayConfig, GatewaySettings, IeeeAddress, LogicalType};
use async_trait::async_trait;
use meshgate_state::{DeviceRegistry, SnapshotDeviceStore};
use meshgate_zcl::{ApplicationMessage, AttributeValue, SchemaCatalog, PROFILE_HOME_AUTOMATION};
use meshgate_zigbee::test_utils::MOCK_ADAPTER_ADDRESS;
use meshgate_zigbee::{
    DeviceCommand, DeviceMessageBody, EndpointDescription, EndpointRegistration, MockRadio,
    NodeDescription, RadioError, RadioEvent, RadioRouter, RouterHandle,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = r#"{
    "TemperatureMeasurement": {
        "ID": 1026,
        "Attributes": {
            "MeasuredValue": { "ID": 0, "Type": 41 },
            "Tolerance": { "ID": 3, "Type": 33 }
        }
    },
    "OnOff": {
        "ID": 6,
        "Attributes": {
            "OnOff": { "ID": 0, "Type": 16 },
            "OnTime": { "ID": 16385, "Type": 33 }
        },
        "Commands": {
            "Off": { "ID": 0 },
            "On": { "ID": 1 },
            "Toggle": { "ID": 2 }
        }
    },
    "IASZone": {
        "ID": 1280,
        "Attributes": {
            "ZoneStatus": { "ID": 2, "Type": 25 }
        }
    }
}"#;

const SENSOR: IeeeAddress = IeeeAddress(0x00124b000724ae04);
const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    radio: Arc<MockRadio>,
    registry: Arc<SnapshotDeviceStore>,
    settings: ConfigStore,
    handle: RouterHandle,
    router: Option<RadioRouter>,
    shutdown: CancellationToken,
}

impl Harness {
    fn new(config: GatewayConfig) -> Self {
        let radio = Arc::new(MockRadio::new());
        let registry = Arc::new(SnapshotDeviceStore::in_memory());
        let settings = ConfigStore::new(GatewaySettings::from(&config));
        let catalog = Arc::new(SchemaCatalog::from_json_str(SCHEMA).unwrap());

        let (router, handle) = RadioRouter::new(
            &config,
            radio.clone(),
            registry.clone(),
            catalog,
            settings.clone(),
        );

        Self {
            radio,
            registry,
            settings,
            handle,
            router: Some(router),
            shutdown: CancellationToken::new(),
        }
    }

    fn start(&mut self) -> JoinHandle<meshgate_zigbee::Result<()>> {
        let router = self.router.take().unwrap();
        tokio::spawn(router.run(self.shutdown.clone()))
    }
}

fn config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.router.workers = 2;
    config.router.queue_depth = 16;
    config.radio.query_timeout = Duration::from_millis(200);
    config
}

fn message(cluster_id: u16, data: &'static [u8]) -> RadioEvent {
    RadioEvent::IncomingMessage {
        node: Device::new(SENSOR, 0x7a2b).with_logical_type(LogicalType::EndDevice),
        link_quality: 168,
        message: ApplicationMessage {
            cluster_id,
            profile_id: PROFILE_HOME_AUTOMATION,
            source_endpoint: 1,
            destination_endpoint: 1,
            data: Bytes::from_static(data),
        },
    }
}

/// Registry whose writes wait until [`GatedRegistry::open`] is called
struct GatedRegistry {
    inner: SnapshotDeviceStore,
    gate: Semaphore,
}

impl GatedRegistry {
    fn closed() -> Self {
        Self {
            inner: SnapshotDeviceStore::in_memory(),
            gate: Semaphore::new(0),
        }
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

#[async_trait]
impl DeviceRegistry for GatedRegistry {
    async fn get_all(&self) -> meshgate_state::Result<Vec<Device>> {
        self.inner.get_all().await
    }

    async fn get(&self, address: IeeeAddress) -> meshgate_state::Result<Device> {
        self.inner.get(address).await
    }

    async fn save(&self, device: &Device) -> meshgate_state::Result<()> {
        let _permit = self.gate.acquire().await;
        self.inner.save(device).await
    }

    async fn delete(&self, address: IeeeAddress) -> meshgate_state::Result<()> {
        self.inner.delete(address).await
    }

    async fn close(&self) -> meshgate_state::Result<()> {
        self.inner.close().await
    }
}

async fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}

// Report attributes, server to client: MeasuredValue (int16 2150) and an
// attribute 0x4001 (uint8 7) the schema does not name
const TEMPERATURE_REPORT: &[u8] = &[
    0x18, 0x01, 0x0a, //
    0x00, 0x00, 0x29, 0x66, 0x08, //
    0x01, 0x40, 0x20, 0x07,
];

// ============================================================================
// Inbound events
// ============================================================================

#[tokio::test]
async fn test_report_names_known_and_unknown_attributes() {
    let mut harness = Harness::new(config());
    let mut messages = harness.handle.events().subscribe_messages();
    let task = harness.start();

    let before = Utc::now();
    harness.radio.inject(message(0x0402, TEMPERATURE_REPORT));

    let received = next(&mut messages).await;
    assert_eq!(received.ieee_address, SENSOR);
    assert_eq!(received.link_quality, 168);

    let DeviceMessageBody::AttributeReport(report) = received.message else {
        panic!("expected an attribute report");
    };
    assert_eq!(report.cluster_id, 0x0402);
    assert_eq!(report.cluster_name, "TemperatureMeasurement");
    assert_eq!(report.attributes.len(), 2);
    assert_eq!(report.attributes["MeasuredValue"], AttributeValue::Signed(2150));
    assert_eq!(report.attributes["0x4001"], AttributeValue::Unsigned(7));

    let stored = harness.registry.get(SENSOR).await.unwrap();
    assert!(stored.last_received >= before);
    assert_eq!(stored.link_quality, 168);
    assert_eq!(stored.network_address, 0x7a2b);

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_read_response_skips_failed_records() {
    let mut harness = Harness::new(config());
    let mut messages = harness.handle.events().subscribe_messages();
    let task = harness.start();

    // OnOff = true, then OnTime with status UNSUPPORTED_ATTRIBUTE
    harness.radio.inject(message(
        0x0006,
        &[0x18, 0x05, 0x01, 0x00, 0x00, 0x00, 0x10, 0x01, 0x01, 0x40, 0x86],
    ));

    let received = next(&mut messages).await;
    let DeviceMessageBody::ReadResponse(report) = received.message else {
        panic!("expected a read response");
    };
    assert_eq!(report.cluster_name, "OnOff");
    assert_eq!(report.attributes.len(), 1);
    assert_eq!(report.attributes["OnOff"], AttributeValue::Bool(true));

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_default_and_zone_status_messages() {
    let mut harness = Harness::new(config());
    let mut messages = harness.handle.events().subscribe_messages();
    let task = harness.start();

    // Default response to Toggle with status SUCCESS
    harness.radio.inject(message(0x0006, &[0x18, 0x02, 0x0b, 0x02, 0x00]));
    // Zone status change notification
    harness.radio.inject(message(
        0x0500,
        &[0x19, 0x22, 0x00, 0x21, 0x00, 0x00, 0x01, 0x00, 0x00],
    ));

    match next(&mut messages).await.message {
        DeviceMessageBody::DefaultResponse {
            cluster_id,
            command_identifier,
            status,
        } => {
            assert_eq!(cluster_id, 6);
            assert_eq!(command_identifier, 2);
            assert_eq!(status, 0);
        }
        other => panic!("unexpected {:?}", other),
    }

    match next(&mut messages).await.message {
        DeviceMessageBody::ZoneStatusChange {
            cluster_id,
            cluster_name,
            notification,
        } => {
            assert_eq!(cluster_id, 0x0500);
            assert_eq!(cluster_name, "IASZone");
            assert_eq!(notification.zone_status, 0x0021);
            assert_eq!(notification.zone_id, 1);
        }
        other => panic!("unexpected {:?}", other),
    }

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_unhandled_commands_are_dropped() {
    let mut harness = Harness::new(config());
    let mut messages = harness.handle.events().subscribe_messages();
    let task = harness.start();

    // Manufacturer-specific cluster command, then garbage, then a report;
    // all from one device so they are handled in order
    harness.radio.inject(message(0xfc00, &[0x05, 0x4f, 0x11, 0x01, 0x02, 0x00]));
    harness.radio.inject(message(0x0402, &[0x18]));
    harness.radio.inject(message(0x0402, TEMPERATURE_REPORT));

    let received = next(&mut messages).await;
    assert!(matches!(received.message, DeviceMessageBody::AttributeReport(_)));

    let stats = harness.handle.stats();
    assert_eq!(stats.events_received, 3);
    assert_eq!(stats.messages_ignored, 1);
    assert_eq!(stats.decode_errors, 1);
    assert_eq!(stats.messages_published, 1);

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_join_saves_and_leave_keeps_record() {
    let mut harness = Harness::new(config());
    let mut joins = harness.handle.events().subscribe_joins();
    let mut leaves = harness.handle.events().subscribe_leaves();
    let task = harness.start();

    let node = Device::new(SENSOR, 0x1111).with_logical_type(LogicalType::Router);
    harness.radio.inject(RadioEvent::NodeJoin { node: node.clone() });
    assert_eq!(next(&mut joins).await.ieee_address, SENSOR);
    assert_eq!(harness.registry.get(SENSOR).await.unwrap().network_address, 0x1111);

    harness.radio.inject(RadioEvent::NodeLeave { node });
    assert_eq!(next(&mut leaves).await.ieee_address, SENSOR);
    assert!(harness.registry.get(SENSOR).await.is_ok());

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_update_overwrites_volatile_fields() {
    let mut harness = Harness::new(config());
    let mut updates = harness.handle.events().subscribe_updates();
    let task = harness.start();

    harness.radio.inject(RadioEvent::NodeJoin {
        node: Device::new(SENSOR, 0x1111),
    });
    harness.radio.inject(RadioEvent::NodeUpdate {
        node: Device::new(SENSOR, 0x2222).with_depth(2),
    });
    next(&mut updates).await;

    let stored = harness.registry.get(SENSOR).await.unwrap();
    assert_eq!(stored.network_address, 0x2222);
    assert_eq!(stored.depth, 2);
    assert_eq!(harness.registry.get_all().await.unwrap().len(), 1);

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_full_worker_queue_drops_event_and_keeps_reading() {
    let mut config = config();
    config.router.workers = 1;
    config.router.queue_depth = 1;
    config.router.enqueue_timeout = Duration::from_millis(50);

    let radio = Arc::new(MockRadio::new());
    let registry = Arc::new(GatedRegistry::closed());
    let settings = ConfigStore::new(GatewaySettings::from(&config));
    let catalog = Arc::new(SchemaCatalog::from_json_str(SCHEMA).unwrap());
    let (router, handle) = RadioRouter::new(&config, radio.clone(), registry.clone(), catalog, settings);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(router.run(shutdown.clone()));

    // The worker blocks on the first save, the second join fills its
    // queue and the third has nowhere to go
    for n in 1..=3u64 {
        radio.inject(RadioEvent::NodeJoin {
            node: Device::new(IeeeAddress(0x00124b0000000100 + n), n as u16),
        });
    }

    let deadline = tokio::time::Instant::now() + WAIT;
    while handle.stats().events_dropped == 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let stats = handle.stats();
    assert_eq!(stats.events_received, 3);
    assert_eq!(stats.events_dropped, 1);

    registry.open();

    // Intake is still running after the drop
    radio.inject(RadioEvent::NodeJoin {
        node: Device::new(IeeeAddress(0x00124b0000000104), 4),
    });

    let deadline = tokio::time::Instant::now() + WAIT;
    while registry.get_all().await.unwrap().len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let mut saved: Vec<u16> = registry
        .get_all()
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.network_address)
        .collect();
    saved.sort_unstable();
    assert_eq!(saved, vec![1, 2, 4]);
    assert_eq!(handle.stats().events_dropped, 1);

    shutdown.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_events_for_one_device_keep_arrival_order() {
    let mut config = config();
    config.router.workers = 4;
    let mut harness = Harness::new(config);
    let mut updates = harness.handle.events().subscribe_updates();
    let task = harness.start();

    for nwk in 1..=10u16 {
        harness.radio.inject(RadioEvent::NodeUpdate {
            node: Device::new(SENSOR, nwk),
        });
    }

    for nwk in 1..=10u16 {
        assert_eq!(next(&mut updates).await.network_address, nwk);
    }
    assert_eq!(harness.registry.get(SENSOR).await.unwrap().network_address, 10);
    assert_eq!(harness.handle.stats().events_dropped, 0);

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_initialise_sequence() {
    let harness = Harness::new(config());
    harness.registry.save(&Device::new(SENSOR, 0x0042)).await.unwrap();
    let mut adapter = harness.handle.events().subscribe_adapter();

    let router = harness.router.as_ref().unwrap();
    let node = router.initialise().await.unwrap();

    assert_eq!(node.ieee_address, MOCK_ADAPTER_ADDRESS);
    assert_eq!(next(&mut adapter).await.ieee_address, MOCK_ADAPTER_ADDRESS);
    assert_eq!(harness.radio.seeded().len(), 1);
    assert_eq!(harness.radio.join_policy_calls(), vec![true]);
    assert_eq!(harness.radio.registrations(), vec![EndpointRegistration::gateway()]);
}

#[tokio::test]
async fn test_initialise_failure_is_reported() {
    let harness = Harness::new(config());
    harness.radio.fail_init();

    let err = harness.router.as_ref().unwrap().initialise().await.unwrap_err();
    assert!(matches!(err, RadioError::Transport(_)));
    assert!(harness.radio.registrations().is_empty());
}

#[tokio::test]
async fn test_shutdown_stops_transport() {
    let mut harness = Harness::new(config());
    let task = harness.start();

    harness.shutdown.cancel();
    task.await.unwrap().unwrap();
    assert!(harness.radio.is_stopped());
}

#[tokio::test]
async fn test_closed_event_stream_ends_router() {
    let mut harness = Harness::new(config());
    let task = harness.start();

    harness.radio.close();
    let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(matches!(result, Err(RadioError::ChannelClosed)));
    assert!(harness.radio.is_stopped());
}

// ============================================================================
// Outbound commands
// ============================================================================

#[tokio::test]
async fn test_send_command_encodes_cluster_frame() {
    let harness = Harness::new(config());

    harness
        .handle
        .execute(DeviceCommand::SendCommand {
            address: SENSOR,
            cluster_id: 0x0008,
            endpoint: 3,
            command_identifier: 0x00,
            parameters: json!({ "Level": 108, "TransitionTime": 5 })
                .as_object()
                .unwrap()
                .clone(),
        })
        .await
        .unwrap();

    let sent = harness.radio.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].address, SENSOR);
    assert!(!sent[0].require_ack);

    let message = &sent[0].message;
    assert_eq!(message.cluster_id, 0x0008);
    assert_eq!(message.profile_id, PROFILE_HOME_AUTOMATION);
    assert_eq!(message.source_endpoint, 1);
    assert_eq!(message.destination_endpoint, 3);
    assert_eq!(message.data[0], 0x01);
    assert_eq!(&message.data[2..], &[0x00, 108, 5, 0]);
}

#[tokio::test]
async fn test_unsupported_command_fails_without_sending() {
    let harness = Harness::new(config());

    let err = harness
        .handle
        .execute(DeviceCommand::SendCommand {
            address: SENSOR,
            cluster_id: 0xfc00,
            endpoint: 1,
            command_identifier: 0x10,
            parameters: Default::default(),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RadioError::UnsupportedCommand {
            cluster_id: 0xfc00,
            command_id: 0x10
        }
    ));
    assert!(harness.radio.sent().is_empty());
    assert_eq!(harness.handle.stats().command_errors, 1);
}

#[tokio::test]
async fn test_negative_level_is_rejected() {
    let harness = Harness::new(config());

    let err = harness
        .handle
        .execute(DeviceCommand::SendCommand {
            address: SENSOR,
            cluster_id: 0x0008,
            endpoint: 1,
            command_identifier: 0x00,
            parameters: json!({ "Level": -5 }).as_object().unwrap().clone(),
        })
        .await
        .unwrap_err();

    assert!(err.is_client_error());
    assert!(harness.radio.sent().is_empty());
}

#[tokio::test]
async fn test_get_attributes_sends_read_request() {
    let harness = Harness::new(config());

    harness
        .handle
        .execute(DeviceCommand::GetAttributes {
            address: SENSOR,
            cluster_id: 0x0402,
            endpoint: 1,
            attributes: vec![0x0000, 0x0003],
        })
        .await
        .unwrap();

    let sent = harness.radio.sent();
    let data = &sent[0].message.data;
    assert_eq!(data[0], 0x00);
    assert_eq!(&data[2..], &[0x00, 0x00, 0x00, 0x03, 0x00]);
}

#[tokio::test]
async fn test_write_attributes_resolves_schema_names() {
    let harness = Harness::new(config());

    harness
        .handle
        .execute(DeviceCommand::WriteAttributes {
            address: SENSOR,
            cluster_id: 0x0006,
            endpoint: 1,
            attributes: json!({ "OnTime": 300, "Bogus": 1 }).as_object().unwrap().clone(),
        })
        .await
        .unwrap();

    let sent = harness.radio.sent();
    assert_eq!(&sent[0].message.data[2..], &[0x02, 0x01, 0x40, 0x21, 0x2c, 0x01]);
}

#[tokio::test]
async fn test_send_failure_is_surfaced() {
    let harness = Harness::new(config());
    harness.radio.fail_sends(true);

    let err = harness
        .handle
        .execute(DeviceCommand::GetAttributes {
            address: SENSOR,
            cluster_id: 0x0006,
            endpoint: 1,
            attributes: vec![0],
        })
        .await
        .unwrap_err();
    assert!(err.is_retriable());
}

#[tokio::test]
async fn test_explore_skips_failed_endpoint() {
    let harness = Harness::new(config());
    let mut descriptions = harness.handle.events().subscribe_descriptions();

    let endpoint = |endpoint: u8| EndpointDescription {
        endpoint,
        profile_id: PROFILE_HOME_AUTOMATION,
        device_id: 0x0302,
        device_version: 1,
        in_cluster_list: vec![0x0000, 0x0402],
        out_cluster_list: vec![],
    };
    harness.radio.script_node(
        SENSOR,
        NodeDescription {
            logical_type: LogicalType::EndDevice,
            manufacturer_code: 0x115f,
        },
        vec![endpoint(1), endpoint(2)],
    );
    harness.radio.fail_endpoint(SENSOR, 2);

    harness
        .handle
        .execute(DeviceCommand::ExploreDevice { address: SENSOR })
        .await
        .unwrap();

    let description = next(&mut descriptions).await;
    assert_eq!(description.ieee_address, SENSOR);
    assert_eq!(description.logical_type, LogicalType::EndDevice);
    assert_eq!(description.manufacturer_code, 0x115f);
    assert_eq!(description.endpoints, vec![endpoint(1)]);
}

#[tokio::test]
async fn test_explore_query_is_bounded() {
    let harness = Harness::new(config());
    harness.radio.script_node(
        SENSOR,
        NodeDescription {
            logical_type: LogicalType::Router,
            manufacturer_code: 0,
        },
        vec![],
    );
    harness.radio.stall_node(SENSOR);

    let err = harness
        .handle
        .execute(DeviceCommand::ExploreDevice { address: SENSOR })
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT");
}

#[tokio::test]
async fn test_join_policy_changes_only_when_different() {
    let harness = Harness::new(config());

    harness
        .handle
        .execute(DeviceCommand::SetJoinPolicy { permit: true })
        .await
        .unwrap();
    assert!(harness.radio.join_policy_calls().is_empty());
    assert_eq!(harness.settings.current().version, 0);

    harness
        .handle
        .execute(DeviceCommand::SetJoinPolicy { permit: false })
        .await
        .unwrap();
    assert_eq!(harness.radio.join_policy_calls(), vec![false]);

    let snapshot = harness.settings.current();
    assert_eq!(snapshot.version, 1);
    assert!(!snapshot.settings.permit_join);
}
