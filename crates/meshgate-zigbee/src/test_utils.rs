//! Test utilities
//!
//! [`MockRadio`] is an in-memory [`RadioTransport`]: tests push events into
//! it, script explore replies and inspect what the router sent.
//!
//! # Example
//!
//! ```rust,ignore
//! let radio = Arc::new(MockRadio::new());
//! radio.inject(RadioEvent::NodeJoin { node: Device::new(addr, 0x1234) });
//! assert_eq!(radio.join_policy_calls(), vec![true]);
//! ```

use async_trait::async_trait;
use meshgate_core::{Device, IeeeAddress, LogicalType, ZigbeeNetworkConfig};
use meshgate_zcl::ApplicationMessage;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::error::{RadioError, Result};
use crate::transport::{
    EndpointDescription, EndpointRegistration, NodeDescription, RadioEvent, RadioTransport,
};

/// Coordinator address reported by [`MockRadio`]
pub const MOCK_ADAPTER_ADDRESS: IeeeAddress = IeeeAddress(0x00124b0000000001);

/// A message captured by [`MockRadio`]
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub address: IeeeAddress,
    pub message: ApplicationMessage,
    pub require_ack: bool,
}

#[derive(Debug, Clone)]
struct ScriptedNode {
    description: NodeDescription,
    endpoints: Vec<EndpointDescription>,
    failing_endpoints: HashSet<u8>,
    stalled: bool,
}

/// Scriptable in-memory radio transport
pub struct MockRadio {
    events_tx: Mutex<Option<mpsc::UnboundedSender<RadioEvent>>>,
    events_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RadioEvent>>,
    sent: Mutex<Vec<SentMessage>>,
    join_policy: Mutex<Vec<bool>>,
    registrations: Mutex<Vec<EndpointRegistration>>,
    seeded: Mutex<Vec<Device>>,
    nodes: Mutex<HashMap<IeeeAddress, ScriptedNode>>,
    fail_init: AtomicBool,
    fail_sends: AtomicBool,
    stopped: AtomicBool,
}

impl Default for MockRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRadio {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            events_tx: Mutex::new(Some(tx)),
            events_rx: tokio::sync::Mutex::new(rx),
            sent: Mutex::new(Vec::new()),
            join_policy: Mutex::new(Vec::new()),
            registrations: Mutex::new(Vec::new()),
            seeded: Mutex::new(Vec::new()),
            nodes: Mutex::new(HashMap::new()),
            fail_init: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        }
    }

    /// Queue an event for the router
    pub fn inject(&self, event: RadioEvent) {
        if let Some(tx) = self.events_tx.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// End the event stream once queued events are read
    pub fn close(&self) {
        self.events_tx.lock().take();
    }

    /// Make `initialise` fail
    pub fn fail_init(&self) {
        self.fail_init.store(true, Ordering::SeqCst);
    }

    /// Make every send fail
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Script the explore replies for a node
    pub fn script_node(&self, address: IeeeAddress, description: NodeDescription, endpoints: Vec<EndpointDescription>) {
        self.nodes.lock().insert(
            address,
            ScriptedNode {
                description,
                endpoints,
                failing_endpoints: HashSet::new(),
                stalled: false,
            },
        );
    }

    /// Make the endpoint description query for one endpoint fail
    pub fn fail_endpoint(&self, address: IeeeAddress, endpoint: u8) {
        if let Some(node) = self.nodes.lock().get_mut(&address) {
            node.failing_endpoints.insert(endpoint);
        }
    }

    /// Make every query for the node hang
    pub fn stall_node(&self, address: IeeeAddress) {
        if let Some(node) = self.nodes.lock().get_mut(&address) {
            node.stalled = true;
        }
    }

    /// Messages sent so far
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Join policies applied so far, in order
    pub fn join_policy_calls(&self) -> Vec<bool> {
        self.join_policy.lock().clone()
    }

    /// Endpoints registered so far
    pub fn registrations(&self) -> Vec<EndpointRegistration> {
        self.registrations.lock().clone()
    }

    /// Devices passed to `initialise`
    pub fn seeded(&self) -> Vec<Device> {
        self.seeded.lock().clone()
    }

    /// Whether `stop` was called
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn node(&self, address: IeeeAddress) -> Result<ScriptedNode> {
        let node = self
            .nodes
            .lock()
            .get(&address)
            .cloned()
            .ok_or_else(|| RadioError::Transport(format!("no route to {}", address)))?;
        if node.stalled {
            std::future::pending::<()>().await;
        }
        Ok(node)
    }
}

#[async_trait]
impl RadioTransport for MockRadio {
    async fn initialise(&self, _network: &ZigbeeNetworkConfig, known: Vec<Device>) -> Result<Device> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(RadioError::Transport("coprocessor not responding".into()));
        }
        *self.seeded.lock() = known;
        Ok(Device::new(MOCK_ADAPTER_ADDRESS, 0x0000).with_logical_type(LogicalType::Coordinator))
    }

    async fn set_join_policy(&self, permit: bool) -> Result<()> {
        self.join_policy.lock().push(permit);
        Ok(())
    }

    async fn register_endpoint(&self, registration: EndpointRegistration) -> Result<()> {
        self.registrations.lock().push(registration);
        Ok(())
    }

    async fn read_event(&self) -> Result<Option<RadioEvent>> {
        Ok(self.events_rx.lock().await.recv().await)
    }

    async fn send_application_message(
        &self,
        address: IeeeAddress,
        message: ApplicationMessage,
        require_ack: bool,
    ) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(RadioError::Transport(format!("no route to {}", address)));
        }
        self.sent.lock().push(SentMessage {
            address,
            message,
            require_ack,
        });
        Ok(())
    }

    async fn query_node_description(&self, address: IeeeAddress) -> Result<NodeDescription> {
        Ok(self.node(address).await?.description)
    }

    async fn query_node_endpoints(&self, address: IeeeAddress) -> Result<Vec<u8>> {
        Ok(self.node(address).await?.endpoints.iter().map(|e| e.endpoint).collect())
    }

    async fn query_node_endpoint_description(
        &self,
        address: IeeeAddress,
        endpoint: u8,
    ) -> Result<EndpointDescription> {
        let node = self.node(address).await?;
        if node.failing_endpoints.contains(&endpoint) {
            return Err(RadioError::Transport(format!("endpoint {} did not respond", endpoint)));
        }
        node.endpoints
            .into_iter()
            .find(|e| e.endpoint == endpoint)
            .ok_or_else(|| RadioError::Transport(format!("no endpoint {}", endpoint)))
    }

    async fn stop(&self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
