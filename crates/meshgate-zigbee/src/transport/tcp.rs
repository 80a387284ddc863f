//! TCP transport to an external coprocessor driver
//!
//! The driver owns the serial link to the radio chip and speaks
//! newline-delimited JSON:
//!
//! ```text
//! -> {"id":7,"method":"query_node_endpoints","params":{"address":"0x00124b000724ae04"}}
//! <- {"id":7,"result":[1,242]}
//! <- {"id":8,"error":"node did not respond"}
//! <- {"event":{"type":"node_join","node":{...}}}
//! ```
//!
//! Replies are matched to requests by `id`. Lines carrying `event` are
//! unsolicited and feed [`RadioTransport::read_event`].

use async_trait::async_trait;
use meshgate_core::{Device, IeeeAddress, ZigbeeNetworkConfig};
use meshgate_zcl::ApplicationMessage;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{EndpointDescription, EndpointRegistration, NodeDescription, RadioEvent, RadioTransport};
use crate::error::{RadioError, Result};

/// Default bound on a single request round trip
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_BUFFER: usize = 256;

type Reply = std::result::Result<Value, String>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

#[derive(Serialize)]
struct Request<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Inbound {
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: RadioEvent,
    },
}

/// Radio transport speaking JSON lines to a driver process
pub struct TcpRadioTransport {
    address: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    events: tokio::sync::Mutex<mpsc::Receiver<RadioEvent>>,
    reader: Mutex<Option<JoinHandle<()>>>,
    request_timeout: Duration,
}

impl TcpRadioTransport {
    /// Connect to a driver listening on `address` (e.g. "127.0.0.1:4590")
    pub async fn connect(address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        let stream = TcpStream::connect(&address)
            .await
            .map_err(|e| RadioError::Transport(format!("connect {}: {}", address, e)))?;
        stream.set_nodelay(true)?;

        let (read_half, write_half) = stream.into_split();
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let reader = tokio::spawn(read_loop(BufReader::new(read_half), pending.clone(), events_tx));

        info!(address = %address, "Connected to radio driver");

        Ok(Self {
            address,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(1),
            events: tokio::sync::Mutex::new(events_rx),
            reader: Mutex::new(Some(reader)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    /// Bound every request except `initialise` by `timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        let _slot = PendingSlot {
            pending: &self.pending,
            id,
        };

        let mut line = serde_json::to_vec(&Request { id, method, params })?;
        line.push(b'\n');

        self.writer.lock().await.write_all(&line).await?;
        trace!(id, method, "Sent radio request");

        let reply = match deadline {
            Some(limit) => tokio::time::timeout(limit, rx)
                .await
                .map_err(|_| RadioError::timeout(method, limit))?,
            None => rx.await,
        };

        let value = reply
            .map_err(|_| RadioError::ChannelClosed)?
            .map_err(|e| RadioError::Transport(format!("{}: {}", method, e)))?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Clears a request's reply slot however the call ends, including when
/// the caller's future is dropped mid-flight
struct PendingSlot<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.id);
    }
}

async fn read_loop(reader: BufReader<OwnedReadHalf>, pending: Pending, events: mpsc::Sender<RadioEvent>) {
    let mut lines = reader.lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Radio driver closed the connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Radio driver read failed");
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<Inbound>(&line) {
            Ok(Inbound::Reply { id, result, error }) => {
                let waiter = pending.lock().remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(match error {
                            Some(message) => Err(message),
                            None => Ok(result),
                        });
                    }
                    None => debug!(id, "Reply for unknown or abandoned request"),
                }
            }
            Ok(Inbound::Event { event }) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!(error = %e, "Malformed line from radio driver"),
        }
    }

    // Dropping the senders fails every outstanding request
    pending.lock().clear();
}

#[async_trait]
impl RadioTransport for TcpRadioTransport {
    async fn initialise(&self, network: &ZigbeeNetworkConfig, known: Vec<Device>) -> Result<Device> {
        self.call("initialise", json!({ "network": network, "devices": known }), None)
            .await
    }

    async fn set_join_policy(&self, permit: bool) -> Result<()> {
        self.call("set_join_policy", json!({ "permit": permit }), Some(self.request_timeout))
            .await
    }

    async fn register_endpoint(&self, registration: EndpointRegistration) -> Result<()> {
        self.call("register_endpoint", serde_json::to_value(registration)?, Some(self.request_timeout))
            .await
    }

    async fn read_event(&self) -> Result<Option<RadioEvent>> {
        let mut events = self.events.lock().await;
        Ok(events.recv().await)
    }

    async fn send_application_message(
        &self,
        address: IeeeAddress,
        message: ApplicationMessage,
        require_ack: bool,
    ) -> Result<()> {
        let params = json!({
            "address": address,
            "message": message,
            "require_ack": require_ack,
        });
        self.call("send_application_message", params, Some(self.request_timeout))
            .await
    }

    async fn query_node_description(&self, address: IeeeAddress) -> Result<NodeDescription> {
        self.call("query_node_description", json!({ "address": address }), Some(self.request_timeout))
            .await
    }

    async fn query_node_endpoints(&self, address: IeeeAddress) -> Result<Vec<u8>> {
        self.call("query_node_endpoints", json!({ "address": address }), Some(self.request_timeout))
            .await
    }

    async fn query_node_endpoint_description(
        &self,
        address: IeeeAddress,
        endpoint: u8,
    ) -> Result<EndpointDescription> {
        let params = json!({ "address": address, "endpoint": endpoint });
        self.call("query_node_endpoint_description", params, Some(self.request_timeout))
            .await
    }

    async fn stop(&self) -> Result<()> {
        if let Err(e) = self.call::<()>("stop", json!({}), Some(self.request_timeout)).await {
            warn!(error = %e, "Radio driver did not acknowledge stop");
        }

        if let Err(e) = self.writer.lock().await.shutdown().await {
            debug!(error = %e, "Error closing radio driver connection");
        }

        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            reader.abort();
        }

        info!(address = %self.address, "Radio transport stopped");
        Ok(())
    }

    fn name(&self) -> &str {
        &self.address
    }
}

impl Drop for TcpRadioTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn driver() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        (listener, address)
    }

    #[tokio::test]
    async fn test_reply_correlation_and_events() {
        let (listener, address) = driver().await;

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();

            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            assert_eq!(request["method"], "set_join_policy");
            assert_eq!(request["params"]["permit"], true);

            let node = Device::new(IeeeAddress(0xbeef), 0x0042);
            let event = json!({ "event": { "type": "node_join", "node": node } });
            let reply = json!({ "id": request["id"], "result": null });
            write_half
                .write_all(format!("{}\n{}\n", event, reply).as_bytes())
                .await
                .unwrap();

            // keep the connection open until the client is done
            let _ = lines.next_line().await;
        });

        let transport = TcpRadioTransport::connect(address).await.unwrap();
        transport.set_join_policy(true).await.unwrap();

        match transport.read_event().await.unwrap() {
            Some(RadioEvent::NodeJoin { node }) => {
                assert_eq!(node.ieee_address, IeeeAddress(0xbeef));
                assert_eq!(node.network_address, 0x0042);
            }
            other => panic!("unexpected event {:?}", other),
        }

        drop(transport);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_is_transport_error() {
        let (listener, address) = driver().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut lines = BufReader::new(read_half).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let request: Value = serde_json::from_str(&line).unwrap();
            let reply = json!({ "id": request["id"], "error": "node did not respond" });
            write_half.write_all(format!("{}\n", reply).as_bytes()).await.unwrap();
            let _ = lines.next_line().await;
        });

        let transport = TcpRadioTransport::connect(address).await.unwrap();
        let err = transport.query_node_endpoints(IeeeAddress(1)).await.unwrap_err();
        assert!(matches!(err, RadioError::Transport(ref m) if m.contains("node did not respond")));
    }

    #[tokio::test]
    async fn test_driver_hangup_ends_event_stream() {
        let (listener, address) = driver().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let transport = TcpRadioTransport::connect(address).await.unwrap();
        assert!(transport.read_event().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_request_timeout() {
        let (listener, address) = driver().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let transport = TcpRadioTransport::connect(address)
            .await
            .unwrap()
            .with_request_timeout(Duration::from_millis(50));
        let err = transport.query_node_description(IeeeAddress(1)).await.unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(transport.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_request_releases_slot() {
        let (listener, address) = driver().await;

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(_)) = lines.next_line().await {}
        });

        let transport = TcpRadioTransport::connect(address).await.unwrap();

        // An outer timeout drops the call before its own deadline
        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            transport.query_node_description(IeeeAddress(1)),
        )
        .await;
        assert!(outcome.is_err());
        assert!(transport.pending.lock().is_empty());

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            transport.initialise(&ZigbeeNetworkConfig::default(), Vec::new()),
        )
        .await;
        assert!(outcome.is_err());
        assert!(transport.pending.lock().is_empty());
    }
}
