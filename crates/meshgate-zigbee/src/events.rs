//! Normalized events emitted by the radio router
//!
//! Every kind has its own broadcast channel. Subscribers that fall behind
//! lose the oldest events and see `RecvError::Lagged`.

use meshgate_core::{Device, IeeeAddress, LogicalType};
use meshgate_zcl::commands::local::ZoneStatusChangeNotification;
use meshgate_zcl::AttributeValue;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::transport::EndpointDescription;

/// A decoded application message from a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceMessage {
    pub ieee_address: IeeeAddress,
    pub link_quality: u8,
    pub message: DeviceMessageBody,
}

/// The payload of a [`DeviceMessage`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceMessageBody {
    /// Unsolicited attribute report
    AttributeReport(AttributeReport),
    /// Answer to a read attributes request
    ReadResponse(AttributeReport),
    /// Status for a previously sent command
    DefaultResponse {
        cluster_id: u16,
        command_identifier: u8,
        status: u8,
    },
    /// Security zone status change
    ZoneStatusChange {
        cluster_id: u16,
        cluster_name: String,
        notification: ZoneStatusChangeNotification,
    },
}

/// Attribute values keyed by schema name
///
/// Attributes the schema does not name are keyed by their numeric ID,
/// formatted as `0x` plus four hex digits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeReport {
    pub cluster_id: u16,
    pub cluster_name: String,
    pub attributes: BTreeMap<String, AttributeValue>,
}

/// Result of exploring a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceDescription {
    pub ieee_address: IeeeAddress,
    pub logical_type: LogicalType,
    pub manufacturer_code: u16,
    pub endpoints: Vec<EndpointDescription>,
}

/// Fan-out channels, one per event kind
#[derive(Debug, Clone)]
pub struct EventChannels {
    messages: broadcast::Sender<DeviceMessage>,
    descriptions: broadcast::Sender<DeviceDescription>,
    joins: broadcast::Sender<Device>,
    leaves: broadcast::Sender<Device>,
    updates: broadcast::Sender<Device>,
    adapter: broadcast::Sender<Device>,
}

impl EventChannels {
    /// Create channels buffering `capacity` events each
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: broadcast::channel(capacity).0,
            descriptions: broadcast::channel(capacity).0,
            joins: broadcast::channel(capacity).0,
            leaves: broadcast::channel(capacity).0,
            updates: broadcast::channel(capacity).0,
            adapter: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_messages(&self) -> broadcast::Receiver<DeviceMessage> {
        self.messages.subscribe()
    }

    pub fn subscribe_descriptions(&self) -> broadcast::Receiver<DeviceDescription> {
        self.descriptions.subscribe()
    }

    pub fn subscribe_joins(&self) -> broadcast::Receiver<Device> {
        self.joins.subscribe()
    }

    pub fn subscribe_leaves(&self) -> broadcast::Receiver<Device> {
        self.leaves.subscribe()
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<Device> {
        self.updates.subscribe()
    }

    /// The coordinator's own node record, sent once after initialisation
    pub fn subscribe_adapter(&self) -> broadcast::Receiver<Device> {
        self.adapter.subscribe()
    }

    pub(crate) fn publish_message(&self, message: DeviceMessage) {
        Self::publish("message", &self.messages, message);
    }

    pub(crate) fn publish_description(&self, description: DeviceDescription) {
        Self::publish("description", &self.descriptions, description);
    }

    pub(crate) fn publish_join(&self, device: Device) {
        Self::publish("join", &self.joins, device);
    }

    pub(crate) fn publish_leave(&self, device: Device) {
        Self::publish("leave", &self.leaves, device);
    }

    pub(crate) fn publish_update(&self, device: Device) {
        Self::publish("update", &self.updates, device);
    }

    pub(crate) fn publish_adapter(&self, device: Device) {
        Self::publish("adapter", &self.adapter, device);
    }

    fn publish<T>(kind: &'static str, tx: &broadcast::Sender<T>, event: T) {
        // No subscribers is not an error
        if tx.send(event).is_err() {
            trace!(kind, "Event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_report_wire_shape() {
        let mut attributes = BTreeMap::new();
        attributes.insert("MeasuredValue".to_string(), AttributeValue::Signed(2150));
        attributes.insert("0x4001".to_string(), AttributeValue::Unsigned(7));

        let message = DeviceMessage {
            ieee_address: IeeeAddress(0x00124b000724ae04),
            link_quality: 160,
            message: DeviceMessageBody::AttributeReport(AttributeReport {
                cluster_id: 0x0402,
                cluster_name: "TemperatureMeasurement".into(),
                attributes,
            }),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "ieee_address": "0x00124b000724ae04",
                "link_quality": 160,
                "message": {
                    "kind": "attribute_report",
                    "cluster_id": 1026,
                    "cluster_name": "TemperatureMeasurement",
                    "attributes": { "0x4001": 7, "MeasuredValue": 2150 }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let channels = EventChannels::new(8);
        let mut first = channels.subscribe_joins();
        let mut second = channels.subscribe_joins();

        channels.publish_join(Device::new(IeeeAddress(5), 1));

        assert_eq!(first.recv().await.unwrap().ieee_address, IeeeAddress(5));
        assert_eq!(second.recv().await.unwrap().ieee_address, IeeeAddress(5));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let channels = EventChannels::new(1);
        channels.publish_leave(Device::new(IeeeAddress(5), 1));
    }
}
