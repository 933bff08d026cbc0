//! Device shadow requests and response subscriptions.
//!
//! Layered on [`BrokerSession`]: response topics are routed to ordinary
//! per-topic handlers, requests are plain publishes on the action topic.

use std::sync::Arc;

use ts_protocol::{
    ShadowAction, ShadowDocument, ShadowOutcome, ShadowTopic, StateMap, topics,
};

use crate::channel::Channel;
use crate::error::{ShadowError, ShadowResult};
use crate::handler::MessageHandler;
use crate::session::BrokerSession;

/// Shadow operations for the session's thing.
///
/// Wraps any `Channel` (real or mock) through the shared session.
pub struct ShadowClient<C: Channel> {
    session: Arc<BrokerSession<C>>,
}

impl<C: Channel> ShadowClient<C> {
    pub fn new(session: Arc<BrokerSession<C>>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<BrokerSession<C>> {
        &self.session
    }

    /// Route one response topic to `handler`, replacing any previous one.
    ///
    /// Invalid pairs such as `(delete, delta)` fail before the transport is
    /// touched.
    pub async fn subscribe_shadow(
        &self,
        action: ShadowAction,
        outcome: ShadowOutcome,
        handler: Arc<dyn MessageHandler>,
    ) -> ShadowResult<()> {
        let topic = ShadowTopic::new(action, outcome)?;
        let name = topics::shadow_response(self.session.thing_name(), topic);
        self.session.subscribe(&name, handler).await?;
        Ok(())
    }

    /// Publish `document` to the update topic.
    ///
    /// A document carrying both reported and desired state is refused.
    pub async fn update_shadow(&self, document: &ShadowDocument) -> ShadowResult<()> {
        document.validate()?;
        let payload =
            serde_json::to_vec(document).map_err(|e| ShadowError::Serialization(e.to_string()))?;
        self.publish(ShadowAction::Update, &payload).await
    }

    /// Like [`update_shadow`](Self::update_shadow), attaching a client token
    /// when absent so the accepted/rejected response can be correlated.
    /// Returns the token.
    pub async fn update_shadow_tracked(&self, mut document: ShadowDocument) -> ShadowResult<String> {
        let token = document.ensure_client_token().to_string();
        self.update_shadow(&document).await?;
        Ok(token)
    }

    /// Report device state: `{"state":{"reported":{...}}}`.
    pub async fn report_state(&self, reported: StateMap) -> ShadowResult<()> {
        self.update_shadow(&ShadowDocument::reported(reported)).await
    }

    /// Request the current shadow. The answer arrives on `get/accepted`.
    pub async fn get_shadow(&self) -> ShadowResult<()> {
        self.publish(ShadowAction::Get, &[]).await
    }

    /// Request deletion of the shadow.
    pub async fn delete_shadow(&self) -> ShadowResult<()> {
        self.publish(ShadowAction::Delete, &[]).await
    }

    async fn publish(&self, action: ShadowAction, payload: &[u8]) -> ShadowResult<()> {
        let topic = topics::shadow_request(self.session.thing_name(), action);
        self.session.publish(&topic, payload).await?;
        tracing::debug!(action = %action, "shadow request sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::InboundMessage;
    use crate::mock::MockChannel;
    use serde_json::json;
    use std::sync::Mutex;
    use ts_protocol::{InvalidShadowTopicError, ShadowDocumentError, ShadowState};

    fn client() -> (Arc<MockChannel>, ShadowClient<MockChannel>) {
        let mock = Arc::new(MockChannel::new());
        let session = Arc::new(BrokerSession::new(mock.clone(), "dev1"));
        (mock, ShadowClient::new(session))
    }

    fn counter() -> (Arc<dyn MessageHandler>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: Arc<dyn MessageHandler> = Arc::new(move |topic: &str, _payload: &[u8]| {
            sink.lock().unwrap().push(topic.to_string());
        });
        (handler, seen)
    }

    fn map(value: serde_json::Value) -> StateMap {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[tokio::test]
    async fn subscribe_all_valid_pairs() {
        let (mock, client) = client();
        for topic in ShadowTopic::ALL {
            let (handler, _) = counter();
            client
                .subscribe_shadow(topic.action(), topic.outcome(), handler)
                .await
                .unwrap();
        }

        assert_eq!(mock.subscriptions().len(), 8);
        assert!(mock.is_subscribed_to("$aws/things/dev1/shadow/update/delta"));
        assert!(mock.is_subscribed_to("$aws/things/dev1/shadow/get/accepted"));
        assert!(mock.is_subscribed_to("$aws/things/dev1/shadow/delete/rejected"));
    }

    #[tokio::test]
    async fn invalid_pair_never_reaches_transport() {
        let (mock, client) = client();
        let (handler, _) = counter();

        let err = client
            .subscribe_shadow(ShadowAction::Delete, ShadowOutcome::Delta, handler)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ShadowError::InvalidTopic(InvalidShadowTopicError {
                action: ShadowAction::Delete,
                outcome: ShadowOutcome::Delta
            })
        ));
        assert!(mock.subscriptions().is_empty());
        assert!(client.session().handlers().is_empty());
    }

    #[tokio::test]
    async fn update_publishes_envelope() {
        let (mock, client) = client();
        client
            .report_state(map(json!({"state": "ready"})))
            .await
            .unwrap();

        let msgs = mock.published_to("$aws/things/dev1/shadow/update");
        assert_eq!(msgs.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&msgs[0].payload).unwrap();
        assert_eq!(body, json!({"state": {"reported": {"state": "ready"}}}));
    }

    #[tokio::test]
    async fn reported_and_desired_rejected_before_publish() {
        let (mock, client) = client();
        let doc = ShadowDocument {
            state: ShadowState {
                reported: Some(map(json!({"a": 1}))),
                desired: Some(map(json!({"a": 2}))),
            },
            ..Default::default()
        };

        let err = client.update_shadow(&doc).await.unwrap_err();
        assert!(matches!(
            err,
            ShadowError::Document(ShadowDocumentError::ReportedAndDesired)
        ));
        assert!(mock.published().is_empty());
    }

    #[tokio::test]
    async fn tracked_update_carries_token() {
        let (mock, client) = client();
        let token = client
            .update_shadow_tracked(ShadowDocument::reported(map(json!({"x": 1}))))
            .await
            .unwrap();

        let msg = mock.last_published().unwrap();
        let body: serde_json::Value = serde_json::from_slice(&msg.payload).unwrap();
        assert_eq!(body["clientToken"], token.as_str());
    }

    #[tokio::test]
    async fn get_and_delete_are_empty_requests() {
        let (mock, client) = client();
        client.get_shadow().await.unwrap();
        client.delete_shadow().await.unwrap();

        let msgs = mock.published();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].topic, "$aws/things/dev1/shadow/get");
        assert!(msgs[0].payload.is_empty());
        assert_eq!(msgs[1].topic, "$aws/things/dev1/shadow/delete");
        assert!(msgs[1].payload.is_empty());
    }

    #[tokio::test]
    async fn same_handler_for_delta_and_documents() {
        let (_mock, client) = client();
        let (handler, seen) = counter();
        client
            .subscribe_shadow(ShadowAction::Update, ShadowOutcome::Delta, handler.clone())
            .await
            .unwrap();
        client
            .subscribe_shadow(ShadowAction::Update, ShadowOutcome::Documents, handler)
            .await
            .unwrap();

        let session = client.session();
        session.dispatch(&InboundMessage::new(
            "$aws/things/dev1/shadow/update/delta",
            b"{}".to_vec(),
        ));
        session.dispatch(&InboundMessage::new(
            "$aws/things/dev1/shadow/update/documents",
            b"{}".to_vec(),
        ));
        assert!(!session.dispatch(&InboundMessage::new(
            "$aws/things/dev1/shadow/update/accepted",
            b"{}".to_vec(),
        )));

        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_fails_when_disconnected() {
        let mock = Arc::new(MockChannel::disconnected());
        let client = ShadowClient::new(Arc::new(BrokerSession::new(mock, "dev1")));

        let err = client.get_shadow().await.unwrap_err();
        assert!(matches!(err, ShadowError::Transport(_)));
    }
}
