//! MQTT bus client built on rumqttc
//!
//! ```text
//!   MqttBusClient::publish ──► AsyncClient ──► request queue ─┐
//!                                                             ▼
//!   BusMessage channel ◄── Publish ◄── EventLoop::poll ◄── broker
//! ```
//!
//! The event loop task owns the connection. On every `ConnAck` it
//! (re)subscribes to `<root>/#` and marks the gateway online. The broker
//! holds a retained `offline` last will for unclean disconnects; a clean
//! shutdown publishes it explicitly before disconnecting.
//!
//! Polling never waits on the router: when the inbound channel is full the
//! message is dropped and counted, so outgoing publications keep draining.

use async_trait::async_trait;
use meshgate_core::MqttConfig;
use rumqttc::{AsyncClient, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::{BusClient, BusMessage};
use crate::error::{BusError, Result};
use crate::topic::Topics;

/// Capacity of the rumqttc request queue
const REQUEST_CAPACITY: usize = 64;

/// Capacity of the inbound message channel
const INBOUND_CAPACITY: usize = 256;

/// Delay between reconnection attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Time allowed for the offline status and disconnect to flush
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

const STATUS_ONLINE: &str = "online";
const STATUS_OFFLINE: &str = "offline";

/// MQTT implementation of [`BusClient`]
pub struct MqttBusClient {
    client: AsyncClient,
}

impl MqttBusClient {
    /// Connect to the broker and start the event loop task
    ///
    /// Returns the shared client, the inbound message stream and the event
    /// loop task, which ends after `shutdown` is cancelled.
    pub fn start(
        config: &MqttConfig,
        shutdown: CancellationToken,
    ) -> (Arc<Self>, mpsc::Receiver<BusMessage>, JoinHandle<()>) {
        let topics = Topics::new(&config.root_topic);

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_last_will(LastWill::new(
            topics.status(),
            STATUS_OFFLINE,
            QoS::AtLeastOnce,
            true,
        ));
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);

        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            root = %config.root_topic,
            "Starting MQTT client"
        );

        let driver = Driver {
            client: client.clone(),
            eventloop,
            topics,
            inbound: tx,
            dropped: 0,
        };
        let task = tokio::spawn(driver.run(shutdown));

        (Arc::new(Self { client }), rx, task)
    }
}

#[async_trait]
impl BusClient for MqttBusClient {
    async fn publish(&self, topic: String, payload: Vec<u8>, retain: bool) -> Result<()> {
        self.client
            .publish(topic.clone(), QoS::AtMostOnce, retain, payload)
            .await
            .map_err(|e| BusError::Publish {
                topic,
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        "mqtt"
    }
}

/// Owner of the rumqttc event loop
struct Driver {
    client: AsyncClient,
    eventloop: EventLoop,
    topics: Topics,
    inbound: mpsc::Sender<BusMessage>,
    dropped: u64,
}

impl Driver {
    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    self.disconnect().await;
                    break;
                }

                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!(code = ?ack.code, "Connected to MQTT broker");
                        self.on_connected();
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = BusMessage::new(publish.topic, publish.payload);
                        if !self.deliver(message) {
                            debug!("Inbound receiver dropped, stopping MQTT client");
                            self.disconnect().await;
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, delay = ?RECONNECT_DELAY, "MQTT connection error");
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                },
            }
        }

        info!(dropped = self.dropped, "MQTT client stopped");
    }

    /// Hand a message to the router without blocking the event loop
    ///
    /// A full channel drops the message. Returns false once the receiver is
    /// gone.
    fn deliver(&mut self, message: BusMessage) -> bool {
        match self.inbound.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                self.dropped += 1;
                warn!(
                    topic = %message.topic,
                    dropped = self.dropped,
                    "Inbound queue full, dropping bus message"
                );
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Subscribe and announce; requests are queued without waiting since
    /// only this task drains the queue
    fn on_connected(&self) {
        let filter = self.topics.subscription();
        if let Err(e) = self.client.try_subscribe(filter.clone(), QoS::AtMostOnce) {
            warn!(topic = %filter, error = %e, "Subscribe failed");
        }

        if let Err(e) = self.client.try_publish(
            self.topics.status(),
            QoS::AtLeastOnce,
            true,
            STATUS_ONLINE,
        ) {
            warn!(error = %e, "Failed to publish online status");
        }
    }

    async fn disconnect(&mut self) {
        let _ = self.client.try_publish(
            self.topics.status(),
            QoS::AtLeastOnce,
            true,
            STATUS_OFFLINE,
        );
        let _ = self.client.try_disconnect();

        let drained = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;

        if drained.is_err() {
            debug!("MQTT disconnect did not complete in time");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn driver(capacity: usize) -> (Driver, mpsc::Receiver<BusMessage>) {
        let options = MqttOptions::new("meshgate-test", "127.0.0.1", 1883);
        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (tx, rx) = mpsc::channel(capacity);
        let driver = Driver {
            client,
            eventloop,
            topics: Topics::new("meshgate"),
            inbound: tx,
            dropped: 0,
        };
        (driver, rx)
    }

    #[tokio::test]
    async fn test_full_inbound_queue_drops_without_waiting() {
        let (mut driver, mut rx) = driver(1);

        assert!(driver.deliver(BusMessage::new("meshgate/gateway/get_config", Bytes::new())));
        assert!(driver.deliver(BusMessage::new("meshgate/gateway/get_devices", Bytes::new())));
        assert_eq!(driver.dropped, 1);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.topic, "meshgate/gateway/get_config");

        // Room again after the router caught up
        assert!(driver.deliver(BusMessage::new("meshgate/gateway/get_devices", Bytes::new())));
        assert_eq!(driver.dropped, 1);
        assert_eq!(rx.recv().await.unwrap().topic, "meshgate/gateway/get_devices");
    }

    #[tokio::test]
    async fn test_closed_inbound_queue_stops_delivery() {
        let (mut driver, rx) = driver(1);
        drop(rx);

        assert!(!driver.deliver(BusMessage::new("meshgate/gateway/get_config", Bytes::new())));
        assert_eq!(driver.dropped, 0);
    }
}
