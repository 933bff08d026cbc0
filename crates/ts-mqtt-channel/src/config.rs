use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::identity::{IdentityContext, ProtocolVersion};

/// MQTT connection configuration, loadable from TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    /// MQTT broker hostname (e.g., AWS IoT endpoint).
    pub broker_host: String,
    /// MQTT broker port (default 8883 for TLS).
    #[serde(default = "default_port")]
    pub broker_port: u16,
    /// MQTT client ID. Defaults to the thing name.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Upper bound on one TLS + CONNECT/CONNACK exchange.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
}

fn default_port() -> u16 {
    8883
}

fn default_connect_timeout() -> u64 {
    60
}

fn default_keepalive() -> u16 {
    60
}

/// Where the device credentials live. Locators are resolved by a
/// [`ResourceResolver`](crate::resources::ResourceResolver).
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Base directory for relative locators.
    #[serde(default)]
    pub resource_dir: Option<PathBuf>,
    /// Device X.509 certificate (PEM or DER).
    pub device_certificate: String,
    /// Device private key (PEM, or PKCS#8 DER).
    pub device_key: String,
    /// Certificate of the CA that issued the device certificate.
    pub root_certificate: String,
    /// Roots trusted for the broker's server certificate.
    #[serde(default = "default_trust_anchors")]
    pub trust_anchors: Vec<TrustAnchorConfig>,
    #[serde(default)]
    pub protocol_version: ProtocolVersion,
}

/// A named trusted server root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrustAnchorConfig {
    pub name: String,
    pub locator: String,
}

fn default_trust_anchors() -> Vec<TrustAnchorConfig> {
    vec![
        TrustAnchorConfig {
            name: "AmazonRootCA3".into(),
            locator: "AmazonRootCA3.pem".into(),
        },
        TrustAnchorConfig {
            name: "SFSRootCAG2".into(),
            locator: "SFSRootCAG2.pem".into(),
        },
    ]
}

/// Everything needed to open a broker session. Built once at startup.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub thing_name: String,
    pub connect_timeout: Duration,
    pub keep_alive: Duration,
    pub identity: Arc<IdentityContext>,
}

impl SessionConfig {
    pub fn new(mqtt: &MqttConfig, thing_name: impl Into<String>, identity: IdentityContext) -> Self {
        let thing_name = thing_name.into();
        Self {
            host: mqtt.broker_host.clone(),
            port: mqtt.broker_port,
            client_id: mqtt.client_id.clone().unwrap_or_else(|| thing_name.clone()),
            thing_name,
            connect_timeout: Duration::from_secs(mqtt.connect_timeout_secs),
            keep_alive: Duration::from_secs(mqtt.keepalive_secs.into()),
            identity: Arc::new(identity),
        }
    }
}
