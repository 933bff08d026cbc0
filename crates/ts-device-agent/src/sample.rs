//! Sample traffic on a plain (non-shadow) topic.
//!
//! Publishes `{"message": <word>}` at a fixed interval, cycling through a
//! short phrase, and logs whatever arrives on the same topic.

use std::time::Duration;

use tokio::time;

use ts_mqtt_channel::{BrokerSession, Channel, MqttError, MqttResult};
use ts_protocol::SampleMessage;

const WORDS: &[&str] = &[
    "ThingSync", "keeps", "this", "device", "and", "its", "shadow", "in", "sync", "over",
    "mutual", "TLS",
];

/// Endless cycle over the sample phrase.
#[derive(Debug, Default)]
pub struct SampleCycle {
    index: usize,
}

impl SampleCycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_message(&mut self) -> SampleMessage {
        let message = SampleMessage {
            message: WORDS[self.index].to_string(),
        };
        self.index = (self.index + 1) % WORDS.len();
        message
    }
}

/// Publish the next sample message to `topic`.
pub async fn publish_next<C: Channel>(
    session: &BrokerSession<C>,
    topic: &str,
    cycle: &mut SampleCycle,
) -> MqttResult<()> {
    let message = cycle.next_message();
    let payload =
        serde_json::to_vec(&message).map_err(|e| MqttError::Publish(e.to_string()))?;
    session.publish(topic, &payload).await
}

/// Run the sample publisher, publishing at `interval`.
///
/// This function runs forever until the task is cancelled. Failed
/// publishes are logged and the cycle moves on.
pub async fn run<C: Channel>(session: &BrokerSession<C>, topic: &str, interval: Duration) {
    let mut cycle = SampleCycle::new();
    let mut ticker = time::interval(interval.max(Duration::from_millis(1)));
    // Skip the first tick (fires immediately).
    ticker.tick().await;

    loop {
        ticker.tick().await;

        if let Err(e) = publish_next(session, topic, &mut cycle).await {
            tracing::warn!(topic = %topic, error = %e, "failed to publish sample message");
        } else {
            tracing::debug!(topic = %topic, "sample message sent");
        }
    }
}

/// Handler for the sample topic: logs what arrived.
pub fn log_sample(topic: &str, payload: &[u8]) {
    tracing::info!(
        topic = %topic,
        payload = %String::from_utf8_lossy(payload),
        "sample message received"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use ts_mqtt_channel::MockChannel;

    #[test]
    fn cycle_wraps_around() {
        let mut cycle = SampleCycle::new();
        let first = cycle.next_message();
        assert_eq!(first.message, "ThingSync");
        for _ in 1..WORDS.len() {
            cycle.next_message();
        }
        assert_eq!(cycle.next_message(), first);
    }

    #[tokio::test]
    async fn publishes_message_json() {
        let mock = Arc::new(MockChannel::new());
        let session = BrokerSession::new(mock.clone(), "dev1");
        let mut cycle = SampleCycle::new();

        publish_next(&session, "awsiot/demo/sample", &mut cycle)
            .await
            .unwrap();
        publish_next(&session, "awsiot/demo/sample", &mut cycle)
            .await
            .unwrap();

        let msgs = mock.published_to("awsiot/demo/sample");
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].payload, br#"{"message":"ThingSync"}"#);
        assert_eq!(msgs[1].payload, br#"{"message":"keeps"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_does_not_stop_the_loop() {
        let mock = Arc::new(MockChannel::disconnected());
        let session = BrokerSession::new(mock.clone(), "dev1");

        let ran = tokio::time::timeout(
            Duration::from_millis(6500),
            run(&session, "awsiot/demo/sample", Duration::from_secs(2)),
        )
        .await;

        // Still running when the timeout fired, despite every publish failing.
        assert!(ran.is_err());
        assert!(mock.published().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_every_interval() {
        let mock = Arc::new(MockChannel::new());
        let session = BrokerSession::new(mock.clone(), "dev1");

        let _ = tokio::time::timeout(
            Duration::from_millis(6500),
            run(&session, "awsiot/demo/sample", Duration::from_secs(2)),
        )
        .await;

        assert_eq!(mock.published_to("awsiot/demo/sample").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_keeps_running() {
        let mock = Arc::new(MockChannel::new());
        let session = BrokerSession::new(mock.clone(), "dev1");

        let ran = tokio::time::timeout(
            Duration::from_millis(5),
            run(&session, "awsiot/demo/sample", Duration::ZERO),
        )
        .await;

        assert!(ran.is_err());
        assert!(!mock.published_to("awsiot/demo/sample").is_empty());
    }
}
