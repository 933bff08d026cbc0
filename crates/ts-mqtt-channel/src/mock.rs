//! Mock MQTT channel for testing without a real broker.
//!
//! Records all published messages and subscription filters for
//! assertion in tests. Connect outcomes can be scripted to exercise
//! the provisioning retry loop.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use rumqttc::QoS;
use tokio::time::Instant;

use crate::channel::Channel;
use crate::error::{ConnectError, ConnectFailure, MqttError, MqttResult};

/// A recorded publish call.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
}

/// Mock implementation of the `Channel` trait.
///
/// Stores all publishes and subscriptions in memory for test verification.
/// Publish and subscribe fail with `NotConnected` while the mock is
/// disconnected.
pub struct MockChannel {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, QoS)>>,
    connect_script: Mutex<VecDeque<Result<(), ConnectFailure>>>,
    connect_instants: Mutex<Vec<Instant>>,
    connect_calls: AtomicU32,
    connected: AtomicBool,
}

impl MockChannel {
    /// A mock whose session is already open.
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(Vec::new()),
            connect_script: Mutex::new(VecDeque::new()),
            connect_instants: Mutex::new(Vec::new()),
            connect_calls: AtomicU32::new(0),
            connected: AtomicBool::new(true),
        }
    }

    /// A mock that starts without a session.
    pub fn disconnected() -> Self {
        let mock = Self::new();
        mock.connected.store(false, Ordering::SeqCst);
        mock
    }

    /// Outcomes returned by successive `connect` calls. Once the script
    /// runs out, `connect` succeeds (or reports an open session).
    pub fn with_connect_script(self, script: Vec<Result<(), ConnectFailure>>) -> Self {
        *self.connect_script.lock().unwrap() = script.into();
        self
    }

    /// Get all published messages.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().unwrap().clone()
    }

    /// Get all subscription filters.
    pub fn subscriptions(&self) -> Vec<(String, QoS)> {
        self.subscriptions.lock().unwrap().clone()
    }

    /// Get the last published message.
    pub fn last_published(&self) -> Option<PublishedMessage> {
        self.published.lock().unwrap().last().cloned()
    }

    /// Get published messages for a specific topic.
    pub fn published_to(&self, topic: &str) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Check whether a subscription was made to the given filter.
    pub fn is_subscribed_to(&self, filter: &str) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|(f, _)| f == filter)
    }

    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// When each `connect` call happened (tokio clock, so paused-time
    /// tests see exact backoff gaps).
    pub fn connect_instants(&self) -> Vec<Instant> {
        self.connect_instants.lock().unwrap().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Simulate the broker dropping the session.
    pub fn drop_session(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Clear all recorded state.
    pub fn reset(&self) {
        self.published.lock().unwrap().clear();
        self.subscriptions.lock().unwrap().clear();
        self.connect_instants.lock().unwrap().clear();
        self.connect_calls.store(0, Ordering::SeqCst);
    }
}

impl Default for MockChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn connect(&self) -> Result<(), ConnectError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.connect_instants.lock().unwrap().push(Instant::now());

        let scripted = self.connect_script.lock().unwrap().pop_front();
        let outcome = match scripted {
            Some(outcome) => outcome,
            None if self.is_connected() => Err(ConnectFailure::AlreadyConnected),
            None => Ok(()),
        };

        match outcome {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(ConnectFailure::AlreadyConnected) => {
                self.connected.store(true, Ordering::SeqCst);
                Err(ConnectError::already_connected())
            }
            Err(cause) => Err(ConnectError::new(cause, "scripted connect failure")),
        }
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.published.lock().unwrap().push(PublishedMessage {
            topic: topic.to_string(),
            payload: payload.to_vec(),
            qos,
        });
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        self.subscriptions
            .lock()
            .unwrap()
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_records_messages() {
        let mock = MockChannel::new();
        mock.publish("test/topic", b"hello", QoS::AtLeastOnce)
            .await
            .unwrap();
        mock.publish("test/other", b"world", QoS::AtMostOnce)
            .await
            .unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "test/topic");
        assert_eq!(msgs[0].payload, b"hello");
        assert_eq!(msgs[1].topic, "test/other");
    }

    #[tokio::test]
    async fn subscribe_records_filters() {
        let mock = MockChannel::new();
        mock.subscribe("$aws/things/dev1/shadow/update/delta", QoS::AtLeastOnce)
            .await
            .unwrap();

        assert!(mock.is_subscribed_to("$aws/things/dev1/shadow/update/delta"));
        assert!(!mock.is_subscribed_to("$aws/things/dev1/shadow/get/accepted"));
    }

    #[tokio::test]
    async fn scripted_connects_then_open_session() {
        let mock = MockChannel::disconnected().with_connect_script(vec![
            Err(ConnectFailure::ConnectionLost),
            Ok(()),
        ]);

        let first = mock.connect().await.unwrap_err();
        assert!(first.is_retryable());
        assert!(!mock.is_connected());

        mock.connect().await.unwrap();
        assert!(mock.is_connected());

        let third = mock.connect().await.unwrap_err();
        assert!(third.is_already_connected());
        assert_eq!(mock.connect_calls(), 3);
    }

    #[tokio::test]
    async fn scripted_already_connected_leaves_session_open() {
        let mock = MockChannel::disconnected()
            .with_connect_script(vec![Err(ConnectFailure::AlreadyConnected)]);

        let err = mock.connect().await.unwrap_err();
        assert!(err.is_already_connected());
        assert!(mock.is_connected());
        mock.subscribe("t", QoS::AtLeastOnce).await.unwrap();
    }

    #[tokio::test]
    async fn disconnected_mock_refuses_traffic() {
        let mock = MockChannel::new();
        mock.disconnect().await.unwrap();

        assert!(matches!(
            mock.publish("t", b"d", QoS::AtMostOnce).await,
            Err(MqttError::NotConnected)
        ));
        assert!(matches!(
            mock.subscribe("t", QoS::AtMostOnce).await,
            Err(MqttError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let mock = MockChannel::new();
        mock.publish("t", b"d", QoS::AtMostOnce).await.unwrap();
        mock.subscribe("f", QoS::AtLeastOnce).await.unwrap();

        mock.reset();
        assert!(mock.published().is_empty());
        assert!(mock.subscriptions().is_empty());
        assert_eq!(mock.connect_calls(), 0);
    }
}
