//! One logical broker connection plus its per-topic handler registry.

use std::sync::Arc;

use rumqttc::QoS;

use crate::channel::Channel;
use crate::error::{ConnectError, MqttResult};
use crate::handler::{HandlerRegistry, InboundMessage, InboundReceiver, MessageHandler};

/// Connect/publish/subscribe over a [`Channel`], with inbound messages
/// routed to the handler registered for their exact topic.
///
/// Register handlers during setup. Dispatch only reads the registry.
pub struct BrokerSession<C: Channel> {
    channel: Arc<C>,
    thing_name: String,
    handlers: HandlerRegistry,
    qos: QoS,
}

impl<C: Channel> BrokerSession<C> {
    pub fn new(channel: Arc<C>, thing_name: impl Into<String>) -> Self {
        Self {
            channel,
            thing_name: thing_name.into(),
            handlers: HandlerRegistry::new(),
            qos: QoS::AtLeastOnce,
        }
    }

    /// Delivery guarantee used for publishes and subscriptions.
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    pub fn thing_name(&self) -> &str {
        &self.thing_name
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    pub async fn connect(&self) -> Result<(), ConnectError> {
        self.channel.connect().await
    }

    pub async fn publish(&self, topic: &str, payload: &[u8]) -> MqttResult<()> {
        self.channel.publish(topic, payload, self.qos).await?;
        tracing::debug!(topic = %topic, bytes = payload.len(), "published");
        Ok(())
    }

    /// Subscribe on the transport, then register `handler` for `topic`.
    /// Any handler already registered for the topic is replaced.
    pub async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> MqttResult<()> {
        self.channel.subscribe(topic, self.qos).await?;
        if self.handlers.insert(topic, handler).is_some() {
            tracing::debug!(topic = %topic, "replaced existing handler");
        }
        tracing::info!(topic = %topic, "subscribed");
        Ok(())
    }

    /// Close the transport session. Registered handlers are kept.
    pub async fn disconnect(&self) -> MqttResult<()> {
        self.channel.disconnect().await
    }

    /// Hand one inbound message to its handler. Unmatched topics are
    /// dropped with a warning.
    pub fn dispatch(&self, message: &InboundMessage) -> bool {
        let delivered = self.handlers.dispatch(message);
        if !delivered {
            tracing::warn!(
                topic = %message.topic,
                bytes = message.payload.len(),
                "no handler registered for topic, dropping message"
            );
        }
        delivered
    }

    /// Dispatch inbound messages until the transport side of the queue
    /// is dropped.
    pub async fn run_dispatch(&self, mut inbound: InboundReceiver) {
        while let Some(message) = inbound.recv().await {
            self.dispatch(&message);
        }
        tracing::debug!("inbound queue closed, dispatcher stopping");
    }
}
