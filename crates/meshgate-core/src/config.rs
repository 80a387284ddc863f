//! Gateway configuration
//!
//! The configuration file is TOML and every section is optional; missing
//! values fall back to the defaults below. Durations are written as
//! humantime strings (`"2m"`, `"30s"`).
//!
//! ```toml
//! permit_join = true
//! log_level = "info"
//! schema_path = "config/zcldef.json"
//!
//! [network]
//! pan_id = 9945
//! channel = 15
//!
//! [mqtt]
//! host = "localhost"
//! root_topic = "meshgate"
//! ```
//!
//! Settings that may change while the gateway runs (currently only the
//! join policy) are not read from [`GatewayConfig`] after startup. They are
//! held by a [`ConfigStore`], which hands out immutable versioned
//! snapshots and publishes replacements through a watch channel.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{CoreError, Result};

/// Default Zigbee PAN identifier
pub const DEFAULT_PAN_ID: u16 = 9945;

/// Default extended PAN identifier
pub const DEFAULT_EXTENDED_PAN_ID: u64 = 0x7ddd_dd7d_dddd_7ddd;

/// Default radio channel
pub const DEFAULT_CHANNEL: u8 = 15;

/// Default network key
pub const DEFAULT_NETWORK_KEY: [u8; 16] = [
    0x01, 0x03, 0x05, 0x07, 0x09, 0x0b, 0x0d, 0x0f, 0x00, 0x02, 0x04, 0x06, 0x08, 0x0a, 0x0c, 0x0d,
];

/// Default MQTT broker port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Default root topic prefix
pub const DEFAULT_ROOT_TOPIC: &str = "meshgate";

/// Valid 2.4GHz Zigbee channels
pub const CHANNEL_RANGE: std::ops::RangeInclusive<u8> = 11..=26;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Whether new devices may join at startup
    #[serde(default = "default_permit_join")]
    pub permit_join: bool,

    /// Log level used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to the cluster schema JSON file
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,

    /// Mesh network parameters
    #[serde(default)]
    pub network: ZigbeeNetworkConfig,

    /// Message bus connection
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Radio transport connection
    #[serde(default)]
    pub radio: RadioConfig,

    /// Device registry storage
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Event dispatch tuning
    #[serde(default)]
    pub router: RouterConfig,
}

fn default_permit_join() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config/zcldef.json")
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            permit_join: true,
            log_level: default_log_level(),
            schema_path: default_schema_path(),
            network: ZigbeeNetworkConfig::default(),
            mqtt: MqttConfig::default(),
            radio: RadioConfig::default(),
            registry: RegistryConfig::default(),
            router: RouterConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load and validate a configuration file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CoreError::ConfigNotFound(path.display().to_string()));
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: GatewayConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        if !CHANNEL_RANGE.contains(&self.network.channel) {
            return Err(CoreError::InvalidConfig(format!(
                "channel {} outside {}..={}",
                self.network.channel,
                CHANNEL_RANGE.start(),
                CHANNEL_RANGE.end()
            )));
        }

        let root = &self.mqtt.root_topic;
        if root.is_empty() || root.contains('#') || root.contains('+') {
            return Err(CoreError::InvalidConfig(format!(
                "root_topic {:?} must be non-empty and free of wildcards",
                root
            )));
        }

        let keep_alive = self.mqtt.keep_alive;
        if !keep_alive.is_zero() && keep_alive < Duration::from_secs(1) {
            return Err(CoreError::InvalidConfig(format!(
                "mqtt.keep_alive {:?} must be zero or at least one second",
                keep_alive
            )));
        }

        if self.router.workers == 0 {
            return Err(CoreError::InvalidConfig(
                "router.workers must be at least 1".to_string(),
            ));
        }
        if self.router.queue_depth == 0 || self.router.max_inflight_bus_messages == 0 {
            return Err(CoreError::InvalidConfig(
                "router queue sizes must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Mesh network formation parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZigbeeNetworkConfig {
    /// 16-bit PAN identifier
    #[serde(default = "default_pan_id")]
    pub pan_id: u16,

    /// 64-bit extended PAN identifier
    #[serde(with = "hex_u64", default = "default_extended_pan_id")]
    pub extended_pan_id: u64,

    /// 128-bit symmetric network key
    #[serde(with = "hex_key", default = "default_network_key")]
    pub network_key: [u8; 16],

    /// Radio channel (11-26)
    #[serde(default = "default_channel")]
    pub channel: u8,
}

fn default_pan_id() -> u16 {
    DEFAULT_PAN_ID
}

fn default_extended_pan_id() -> u64 {
    DEFAULT_EXTENDED_PAN_ID
}

fn default_network_key() -> [u8; 16] {
    DEFAULT_NETWORK_KEY
}

fn default_channel() -> u8 {
    DEFAULT_CHANNEL
}

impl Default for ZigbeeNetworkConfig {
    fn default() -> Self {
        Self {
            pan_id: DEFAULT_PAN_ID,
            extended_pan_id: DEFAULT_EXTENDED_PAN_ID,
            network_key: DEFAULT_NETWORK_KEY,
            channel: DEFAULT_CHANNEL,
        }
    }
}

/// MQTT broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker host name
    #[serde(default = "default_mqtt_host")]
    pub host: String,

    /// Broker port
    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    /// Prefix of every topic the gateway publishes or subscribes to
    #[serde(default = "default_root_topic")]
    pub root_topic: String,

    /// MQTT client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Optional username
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password
    #[serde(default)]
    pub password: Option<String>,

    /// Keep-alive interval
    #[serde(with = "humantime_serde", default = "default_keep_alive")]
    pub keep_alive: Duration,
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_root_topic() -> String {
    DEFAULT_ROOT_TOPIC.to_string()
}

fn default_client_id() -> String {
    "meshgate".to_string()
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(60)
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: DEFAULT_MQTT_PORT,
            root_topic: default_root_topic(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive: default_keep_alive(),
        }
    }
}

/// Radio transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Address of the coprocessor driver (`host:port`)
    #[serde(default = "default_radio_address")]
    pub address: String,

    /// Upper bound on the whole initialization sequence
    #[serde(with = "humantime_serde", default = "default_init_timeout")]
    pub init_timeout: Duration,

    /// Upper bound on each explore sub-query
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub query_timeout: Duration,
}

fn default_radio_address() -> String {
    "127.0.0.1:4590".to_string()
}

fn default_init_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: default_radio_address(),
            init_timeout: default_init_timeout(),
            query_timeout: default_query_timeout(),
        }
    }
}

/// Device registry storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    /// SQLite database, durable per write
    Sqlite,
    /// In-memory map flushed to a JSON file periodically
    Snapshot,
}

/// Device registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Storage backend
    #[serde(default = "default_backend")]
    pub backend: RegistryBackend,

    /// Database or snapshot file path
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,

    /// Snapshot flush period (snapshot backend only)
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub flush_interval: Duration,
}

fn default_backend() -> RegistryBackend {
    RegistryBackend::Sqlite
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("meshgate.db")
}

fn default_flush_interval() -> Duration {
    Duration::from_secs(30)
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_registry_path(),
            flush_interval: default_flush_interval(),
        }
    }
}

/// Event dispatch tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Number of radio event workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Bounded queue depth per worker
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// How long the event loop waits on a full worker queue before dropping
    #[serde(with = "humantime_serde", default = "default_enqueue_timeout")]
    pub enqueue_timeout: Duration,

    /// Maximum bus messages handled concurrently
    #[serde(default = "default_max_inflight")]
    pub max_inflight_bus_messages: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    256
}

fn default_enqueue_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_max_inflight() -> usize {
    64
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            enqueue_timeout: default_enqueue_timeout(),
            max_inflight_bus_messages: default_max_inflight(),
        }
    }
}

// ============================================================================
// Runtime settings
// ============================================================================

/// Settings that may be changed while the gateway runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySettings {
    /// Whether the coordinator permits new devices to join
    pub permit_join: bool,
}

impl From<&GatewayConfig> for GatewaySettings {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            permit_join: config.permit_join,
        }
    }
}

/// An immutable, versioned view of the runtime settings
#[derive(Debug, Clone)]
pub struct SettingsSnapshot {
    /// Monotonic version, starting at 0
    pub version: u64,
    /// The settings at this version
    pub settings: Arc<GatewaySettings>,
}

/// Owner of the runtime settings
///
/// Cloning the store is cheap and every clone observes the same snapshots.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tx: Arc<watch::Sender<SettingsSnapshot>>,
}

impl ConfigStore {
    /// Create a store holding version 0 of `settings`
    pub fn new(settings: GatewaySettings) -> Self {
        let (tx, _rx) = watch::channel(SettingsSnapshot {
            version: 0,
            settings: Arc::new(settings),
        });
        Self { tx: Arc::new(tx) }
    }

    /// Get the current snapshot
    pub fn current(&self) -> SettingsSnapshot {
        self.tx.borrow().clone()
    }

    /// Replace the settings, returning the new snapshot
    pub fn update<F>(&self, f: F) -> SettingsSnapshot
    where
        F: FnOnce(&GatewaySettings) -> GatewaySettings,
    {
        self.tx.send_modify(|snapshot| {
            let next = f(&snapshot.settings);
            *snapshot = SettingsSnapshot {
                version: snapshot.version + 1,
                settings: Arc::new(next),
            };
        });
        self.current()
    }

    /// Watch for new snapshots
    pub fn subscribe(&self) -> watch::Receiver<SettingsSnapshot> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Serde helpers
// ============================================================================

mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// Extended PAN ids are written as "0x..." strings; TOML integers are signed.
mod hex_u64 {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("{:#018x}", value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let digits = s.trim_start_matches("0x").trim_start_matches("0X");
        u64::from_str_radix(digits, 16).map_err(serde::de::Error::custom)
    }
}

mod hex_key {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &[u8; 16], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 16], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.trim()).map_err(serde::de::Error::custom)?;
        <[u8; 16]>::try_from(bytes.as_slice())
            .map_err(|_| serde::de::Error::custom("network key must be 16 bytes"))
    }
}
