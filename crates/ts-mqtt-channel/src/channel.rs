//! MQTT channel: async transport to the broker.
//!
//! Wraps `rumqttc::AsyncClient` behind the [`Channel`] trait. Unlike a
//! lazily connecting client, [`MqttChannel::connect`] drives the event loop
//! until the CONNACK arrives so the caller can classify handshake failures.
//! After that the event loop runs in its own task and forwards inbound
//! publishes to an [`InboundSender`].

use std::error::Error as StdError;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
    TlsConfiguration, Transport,
};
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::error::{ConnectError, ConnectFailure, MqttError, MqttResult};
use crate::handler::{InboundMessage, InboundSender};

/// Delay before polling again after the event loop reports an error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// How long `disconnect` waits for the DISCONNECT packet to be flushed.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the request queue between `AsyncClient` and the event loop.
const REQUEST_CAPACITY: usize = 64;

// ── Channel trait ─────────────────────────────────────────────

/// Abstraction over the pub/sub transport.
///
/// Enables mocking in tests without a real MQTT broker.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Open the session. Fails with a classified [`ConnectError`].
    async fn connect(&self) -> Result<(), ConnectError>;

    /// Publish a raw payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()>;

    /// Close the session.
    async fn disconnect(&self) -> MqttResult<()>;
}

// ── MqttChannel ───────────────────────────────────────────────

struct Link {
    client: AsyncClient,
    driver: JoinHandle<()>,
}

/// Subscriptions issued on this channel, replayed when the broker comes
/// back without a persisted session.
type SubscriptionLog = Arc<Mutex<Vec<(String, QoS)>>>;

/// MQTT channel connected over mutual TLS.
pub struct MqttChannel {
    config: SessionConfig,
    inbound: InboundSender,
    link: tokio::sync::Mutex<Option<Link>>,
    subscriptions: SubscriptionLog,
}

impl MqttChannel {
    pub fn new(config: SessionConfig, inbound: InboundSender) -> Self {
        Self {
            config,
            inbound,
            link: tokio::sync::Mutex::new(None),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn options(&self) -> MqttOptions {
        let mut options =
            MqttOptions::new(&self.config.client_id, &self.config.host, self.config.port);
        options.set_keep_alive(self.config.keep_alive);
        options.set_transport(Transport::tls_with_config(TlsConfiguration::Rustls(
            self.config.identity.tls_config(),
        )));
        options
    }

    /// Client and event loop for one handshake. rumqttc bounds TCP, TLS
    /// and CONNACK with its own timeout, so it is aligned with ours.
    fn event_loop(&self) -> (AsyncClient, EventLoop) {
        let (client, mut eventloop) = AsyncClient::new(self.options(), REQUEST_CAPACITY);
        eventloop
            .network_options
            .set_connection_timeout(self.config.connect_timeout.as_secs());
        (client, eventloop)
    }

    async fn client(&self) -> MqttResult<AsyncClient> {
        let link = self.link.lock().await;
        match link.as_ref() {
            Some(link) if !link.driver.is_finished() => Ok(link.client.clone()),
            _ => Err(MqttError::NotConnected),
        }
    }

    fn record_subscription(&self, filter: &str, qos: QoS) {
        let mut subs = self
            .subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match subs.iter_mut().find(|(f, _)| f == filter) {
            Some(entry) => entry.1 = qos,
            None => subs.push((filter.to_string(), qos)),
        }
    }
}

#[async_trait]
impl Channel for MqttChannel {
    async fn connect(&self) -> Result<(), ConnectError> {
        // Held across the handshake: a concurrent connect waits, then sees
        // the open session.
        let mut link = self.link.lock().await;
        if link.as_ref().is_some_and(|l| !l.driver.is_finished()) {
            return Err(ConnectError::already_connected());
        }

        let (client, mut eventloop) = self.event_loop();

        let handshake = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => return Ok(ack),
                    Ok(_) => continue,
                    Err(e) => return Err(e),
                }
            }
        };

        let ack = match tokio::time::timeout(self.config.connect_timeout, handshake).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => return Err(classify_connection_error(&e)),
            Err(_) => {
                return Err(ConnectError::new(
                    ConnectFailure::Timeout,
                    format!(
                        "no CONNACK from {}:{} within {}s",
                        self.config.host,
                        self.config.port,
                        self.config.connect_timeout.as_secs()
                    ),
                ));
            }
        };

        tracing::info!(
            host = %self.config.host,
            client_id = %self.config.client_id,
            session_present = ack.session_present,
            "MQTT session established"
        );

        let driver = tokio::spawn(drive(
            eventloop,
            client.clone(),
            self.inbound.clone(),
            Arc::clone(&self.subscriptions),
        ));
        *link = Some(Link { client, driver });
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8], qos: QoS) -> MqttResult<()> {
        self.client()
            .await?
            .publish(topic, qos, false, payload.to_vec())
            .await
            .map_err(|e| MqttError::Publish(e.to_string()))
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> MqttResult<()> {
        self.client()
            .await?
            .subscribe(filter, qos)
            .await
            .map_err(|e| MqttError::Subscribe(e.to_string()))?;
        self.record_subscription(filter, qos);
        Ok(())
    }

    async fn disconnect(&self) -> MqttResult<()> {
        let Some(link) = self.link.lock().await.take() else {
            return Ok(());
        };

        let result = link
            .client
            .disconnect()
            .await
            .map_err(|e| MqttError::Disconnect(e.to_string()));

        if tokio::time::timeout(DISCONNECT_GRACE, link.driver)
            .await
            .is_err()
        {
            tracing::warn!("MQTT event loop did not stop after disconnect");
        }
        result
    }
}

/// Drive the event loop after the handshake, forwarding inbound publishes.
///
/// rumqttc reconnects on the next poll after an error; subscriptions are
/// replayed when the broker reports no persisted session.
async fn drive(
    mut eventloop: EventLoop,
    client: AsyncClient,
    inbound: InboundSender,
    subscriptions: SubscriptionLog,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic.clone(), publish.payload.to_vec());
                if inbound.send(message).is_err() {
                    tracing::debug!("inbound receiver dropped, stopping MQTT event loop");
                    return;
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                tracing::info!(session_present = ack.session_present, "MQTT reconnected");
                if !ack.session_present {
                    resubscribe(&client, &subscriptions);
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!("MQTT disconnect sent, stopping event loop");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error, reconnecting in 5s");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

fn resubscribe(client: &AsyncClient, subscriptions: &SubscriptionLog) {
    let subs = subscriptions
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    for (filter, qos) in subs {
        // try_subscribe: the event loop is not being polled while we are here.
        if let Err(e) = client.try_subscribe(filter.as_str(), qos) {
            tracing::warn!(filter = %filter, error = %e, "failed to restore subscription");
        }
    }
}

/// Map a handshake failure onto the retry classification.
pub(crate) fn classify_connection_error(err: &ConnectionError) -> ConnectError {
    let cause = match err {
        ConnectionError::ConnectionRefused(_) => ConnectFailure::Rejected,
        ConnectionError::NetworkTimeout => ConnectFailure::Timeout,
        other if is_connection_lost(other) => ConnectFailure::ConnectionLost,
        _ => ConnectFailure::Protocol,
    };
    ConnectError::new(cause, err.to_string())
}

/// Walk the source chain looking for an I/O error that means the peer
/// closed the connection.
fn is_connection_lost(err: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<io::Error>() {
            if matches!(
                io.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
            ) {
                return true;
            }
        }
        current = e.source();
    }
    false
}
