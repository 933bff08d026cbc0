//! Shared test harness for E2E integration tests.
//!
//! Wires a device `Agent` to a scripted `MockChannel`, with inbound
//! traffic flowing through the same queue and dispatcher the binary uses.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use ts_device_agent::{Agent, SampleConfig};
use ts_mqtt_channel::{
    BrokerSession, ConnectFailure, InboundMessage, InboundSender, MessageHandler, MockChannel,
    RetryPolicy, inbound_channel,
};
use ts_protocol::default_attributes;

pub const THING: &str = "dev1";

/// Agent + mock broker + running dispatcher.
pub struct TestDevice {
    pub mqtt: Arc<MockChannel>,
    pub agent: Agent<MockChannel>,
    inbound: InboundSender,
    dispatcher: JoinHandle<()>,
}

impl TestDevice {
    /// A device whose connect attempts follow `script`.
    pub fn with_connect_script(script: Vec<Result<(), ConnectFailure>>) -> Self {
        let mqtt = Arc::new(MockChannel::disconnected().with_connect_script(script));
        let session = Arc::new(BrokerSession::new(mqtt.clone(), THING));

        let (inbound, rx) = inbound_channel();
        let dispatcher = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.run_dispatch(rx).await })
        };

        let agent = Agent::new(
            session,
            RetryPolicy::default(),
            SampleConfig::default(),
            default_attributes(),
        );

        Self {
            mqtt,
            agent,
            inbound,
            dispatcher,
        }
    }

    /// A device that connects on the first try.
    pub fn provisioned() -> Self {
        Self::with_connect_script(Vec::new())
    }

    /// Simulate the broker publishing `payload` on `topic`, and wait until
    /// the dispatcher has handled it.
    pub async fn deliver(&self, topic: &str, payload: &[u8]) {
        self.inbound
            .send(InboundMessage::new(topic, payload.to_vec()))
            .expect("dispatcher stopped");
        // The queue is FIFO: once a marker sent afterwards is seen, the
        // message before it has been dispatched.
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let tx = Mutex::new(Some(tx));
        let marker = format!("test/marker/{}", next_marker_id());
        self.agent
            .session()
            .handlers()
            .insert(&*marker, Arc::new(move |_topic: &str, _payload: &[u8]| {
                if let Some(tx) = tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }));
        self.inbound
            .send(InboundMessage::new(marker, Vec::new()))
            .expect("dispatcher stopped");
        rx.await.expect("marker not dispatched");
    }

    pub fn shadow_topic(suffix: &str) -> String {
        format!("$aws/things/{THING}/shadow/{suffix}")
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

fn next_marker_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT: AtomicU64 = AtomicU64::new(0);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

/// Handler that records the payloads it receives.
pub fn recorder() -> (Arc<dyn MessageHandler>, Arc<Mutex<Vec<Vec<u8>>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let handler: Arc<dyn MessageHandler> = Arc::new(move |_topic: &str, payload: &[u8]| {
        sink.lock().unwrap().push(payload.to_vec());
    });
    (handler, seen)
}

/// A scratch directory holding a self-signed device identity plus two
/// trust anchors, laid out like `/etc/thingsync`.
pub struct CredentialDir {
    pub path: PathBuf,
}

impl CredentialDir {
    pub fn create(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "thingsync-e2e-{name}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&path).unwrap();

        let device = rcgen::generate_simple_self_signed(vec![THING.to_string()]).unwrap();
        let root = rcgen::generate_simple_self_signed(vec!["issuer".to_string()]).unwrap();
        let ca3 = rcgen::generate_simple_self_signed(vec!["ca3.example.com".to_string()]).unwrap();
        let sfs = rcgen::generate_simple_self_signed(vec!["sfs.example.com".to_string()]).unwrap();

        std::fs::write(path.join("device.pem"), device.cert.pem()).unwrap();
        std::fs::write(path.join("device.key"), device.key_pair.serialize_pem()).unwrap();
        std::fs::write(path.join("root.pem"), root.cert.pem()).unwrap();
        std::fs::write(path.join("AmazonRootCA3.pem"), ca3.cert.pem()).unwrap();
        std::fs::write(path.join("SFSRootCAG2.pem"), sfs.cert.pem()).unwrap();

        Self { path }
    }

    /// Agent config pointing at this directory.
    pub fn agent_toml(&self) -> String {
        format!(
            r#"
thing_name = "{THING}"

[mqtt]
broker_host = "localhost"
broker_port = 8883

[identity]
resource_dir = "{}"
device_certificate = "device.pem"
device_key = "device.key"
root_certificate = "root.pem"
"#,
            self.path.display()
        )
    }
}

impl Drop for CredentialDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
