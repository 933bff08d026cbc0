//! Device agent configuration, loadable from TOML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use ts_mqtt_channel::{IdentityConfig, MqttConfig, RetryPolicy};
use ts_protocol::{StateMap, default_attributes};

/// Top-level configuration for the device agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Thing name registered with the broker; namespaces the shadow topics.
    pub thing_name: String,
    /// MQTT connection settings.
    pub mqtt: MqttConfig,
    /// Device credentials and trusted server roots.
    pub identity: IdentityConfig,
    /// JITP retry bounds.
    #[serde(default)]
    pub provisioning: RetryPolicy,
    #[serde(default)]
    pub sample: SampleConfig,
    /// Attributes sent in the initial reported state.
    #[serde(default = "default_attributes")]
    pub device: StateMap,
}

/// Periodic sample publishing on a plain (non-shadow) topic.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleConfig {
    #[serde(default = "default_sample_enabled")]
    pub enabled: bool,
    #[serde(default = "default_sample_topic")]
    pub topic: String,
    #[serde(default = "default_sample_interval")]
    pub interval_ms: u64,
}

fn default_sample_enabled() -> bool {
    true
}

fn default_sample_topic() -> String {
    "awsiot/demo/sample".to_string()
}

fn default_sample_interval() -> u64 {
    2000
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            enabled: default_sample_enabled(),
            topic: default_sample_topic(),
            interval_ms: default_sample_interval(),
        }
    }
}

impl SampleConfig {
    /// Publish period, never shorter than 1 ms.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that parse but cannot run.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.sample.enabled && self.sample.interval_ms == 0 {
            anyhow::bail!("sample.interval_ms must be greater than zero");
        }
        Ok(())
    }

    /// Directory relative credential locators are resolved against:
    /// `identity.resource_dir` if set, else the directory holding the
    /// config file.
    pub fn resource_dir(&self, config_path: &str) -> PathBuf {
        match &self.identity.resource_dir {
            Some(dir) => dir.clone(),
            None => Path::new(config_path)
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ts_mqtt_channel::ProtocolVersion;

    const MINIMAL: &str = r#"
thing_name = "dev1"

[mqtt]
broker_host = "a1b2c3-ats.iot.eu-west-3.amazonaws.com"

[identity]
device_certificate = "device.pem"
device_key = "device.key"
root_certificate = "root.pem"
"#;

    #[test]
    fn deserialize_minimal_config() {
        let config: AgentConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.thing_name, "dev1");
        assert_eq!(config.mqtt.broker_port, 8883); // default
        assert_eq!(config.mqtt.connect_timeout_secs, 60);
        assert!(config.mqtt.client_id.is_none());
        assert_eq!(config.provisioning.max_attempts, 3);
        assert_eq!(config.provisioning.base_delay_ms, 1000);
        assert!(config.sample.enabled);
        assert_eq!(config.sample.topic, "awsiot/demo/sample");
        assert_eq!(config.sample.interval(), Duration::from_secs(2));
        assert_eq!(config.identity.protocol_version, ProtocolVersion::Tls12);
        assert_eq!(config.device["firmware-version"], "1.8.3");

        let anchors: Vec<&str> = config
            .identity
            .trust_anchors
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(anchors, ["AmazonRootCA3", "SFSRootCAG2"]);
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
thing_name = "sensor-042"

[mqtt]
broker_host = "broker.example.com"
broker_port = 443
client_id = "sensor-042-agent"
connect_timeout_secs = 10
keepalive_secs = 30

[identity]
resource_dir = "/etc/thingsync/certs"
device_certificate = "device.der"
device_key = "device.key"
root_certificate = "root.pem"
protocol_version = "tls1.3"

[[identity.trust_anchors]]
name = "PrimaryRoot"
locator = "primary.pem"

[[identity.trust_anchors]]
name = "MigrationRoot"
locator = "migration.pem"

[provisioning]
max_attempts = 5
base_delay_ms = 250

[sample]
enabled = false
topic = "lab/sample"
interval_ms = 500

[device]
state = "booting"
firmware-version = "2.0.0"
"#;
        let config: AgentConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.broker_port, 443);
        assert_eq!(config.mqtt.client_id.as_deref(), Some("sensor-042-agent"));
        assert_eq!(config.identity.protocol_version, ProtocolVersion::Tls13);
        assert_eq!(config.identity.trust_anchors.len(), 2);
        assert_eq!(config.identity.trust_anchors[1].name, "MigrationRoot");
        assert_eq!(config.provisioning.max_attempts, 5);
        assert_eq!(config.provisioning.base_delay(), Duration::from_millis(250));
        assert!(!config.sample.enabled);
        assert_eq!(config.device.len(), 2);
        assert_eq!(config.device["state"], "booting");
        assert_eq!(
            config.resource_dir("/anywhere/agent.toml"),
            PathBuf::from("/etc/thingsync/certs")
        );
    }

    #[test]
    fn resource_dir_defaults_to_config_directory() {
        let config: AgentConfig = toml::from_str(MINIMAL).unwrap();
        assert_eq!(
            config.resource_dir("/etc/thingsync/agent.toml"),
            PathBuf::from("/etc/thingsync")
        );
    }

    #[test]
    fn zero_sample_interval_is_rejected_on_load() {
        let path = std::env::temp_dir().join(format!(
            "thingsync-zero-interval-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, format!("{MINIMAL}\n[sample]\ninterval_ms = 0\n")).unwrap();

        let err = AgentConfig::from_file(path.to_str().unwrap()).unwrap_err();
        std::fs::remove_file(&path).unwrap();

        assert!(err.to_string().contains("interval_ms"));
    }

    #[test]
    fn zero_interval_allowed_when_sampling_disabled() {
        let toml = format!("{MINIMAL}\n[sample]\nenabled = false\ninterval_ms = 0\n");
        let config: AgentConfig = toml::from_str(&toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.sample.interval(), Duration::from_millis(1));
    }

    #[test]
    fn missing_identity_is_an_error() {
        let toml = r#"
thing_name = "dev1"

[mqtt]
broker_host = "broker.example.com"
"#;
        assert!(toml::from_str::<AgentConfig>(toml).is_err());
    }
}
