//! Handlers for the shadow response topics.
//!
//! Every response is decoded just enough to log something useful; the
//! agent does not act on desired state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use ts_mqtt_channel::{Channel, MessageHandler, ShadowClient, ShadowResult};
use ts_protocol::{
    ShadowAction, ShadowDelta, ShadowDocuments, ShadowErrorResponse, ShadowOutcome, ShadowTopic,
    client_token_of, parse_shadow_topic,
};

/// What one shadow response said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShadowEvent {
    Accepted {
        action: ShadowAction,
        version: Option<u64>,
        client_token: Option<String>,
    },
    Rejected {
        action: ShadowAction,
        code: u16,
        message: String,
        client_token: Option<String>,
    },
    /// Fields where desired differs from reported.
    Delta { version: u64, fields: Vec<String> },
    Documents {
        previous_version: Option<u64>,
        current_version: u64,
    },
    /// Topic or payload could not be decoded.
    Undecodable { reason: String },
}

/// Decode a response published on a shadow response topic.
pub fn interpret(topic: &str, payload: &[u8]) -> ShadowEvent {
    let Some(parsed) = parse_shadow_topic(topic) else {
        return ShadowEvent::Undecodable {
            reason: format!("not a shadow response topic: {topic}"),
        };
    };
    let action = parsed.topic.action();

    let undecodable = |e: serde_json::Error| ShadowEvent::Undecodable {
        reason: e.to_string(),
    };

    match parsed.topic.outcome() {
        ShadowOutcome::Accepted => match serde_json::from_slice::<serde_json::Value>(payload) {
            Ok(value) => ShadowEvent::Accepted {
                action,
                version: value.get("version").and_then(serde_json::Value::as_u64),
                client_token: client_token_of(payload),
            },
            Err(e) => undecodable(e),
        },
        ShadowOutcome::Rejected => match serde_json::from_slice::<ShadowErrorResponse>(payload) {
            Ok(err) => ShadowEvent::Rejected {
                action,
                code: err.code,
                message: err.message,
                client_token: err.client_token,
            },
            Err(e) => undecodable(e),
        },
        ShadowOutcome::Delta => match serde_json::from_slice::<ShadowDelta>(payload) {
            Ok(delta) => ShadowEvent::Delta {
                version: delta.version,
                fields: delta.state.keys().cloned().collect(),
            },
            Err(e) => undecodable(e),
        },
        ShadowOutcome::Documents => match serde_json::from_slice::<ShadowDocuments>(payload) {
            Ok(docs) => ShadowEvent::Documents {
                previous_version: docs.previous.map(|p| p.version),
                current_version: docs.current.version,
            },
            Err(e) => undecodable(e),
        },
    }
}

/// Logs every response it receives and counts them.
pub struct ShadowLogger {
    name: &'static str,
    received: AtomicU64,
}

impl ShadowLogger {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            received: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Messages handled so far.
    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }
}

impl MessageHandler for ShadowLogger {
    fn receive(&self, topic: &str, payload: &[u8]) {
        self.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            handler = self.name,
            topic = %topic,
            payload = %String::from_utf8_lossy(payload),
            "shadow response"
        );

        match interpret(topic, payload) {
            ShadowEvent::Accepted {
                action,
                version,
                client_token,
            } => {
                tracing::info!(action = %action, ?version, ?client_token, "shadow request accepted");
            }
            ShadowEvent::Rejected {
                action,
                code,
                message,
                client_token,
            } => {
                tracing::warn!(
                    action = %action,
                    code,
                    message = %message,
                    ?client_token,
                    "shadow request rejected"
                );
            }
            ShadowEvent::Delta { version, fields } => {
                tracing::info!(version, ?fields, "shadow delta received");
            }
            ShadowEvent::Documents {
                previous_version,
                current_version,
            } => {
                tracing::info!(?previous_version, current_version, "shadow documents updated");
            }
            ShadowEvent::Undecodable { reason } => {
                tracing::warn!(handler = self.name, topic = %topic, reason = %reason, "undecodable shadow response");
            }
        }
    }
}

/// One logger per response topic, except that `update/delta` and
/// `update/documents` share theirs.
pub struct ShadowHandlers {
    pub get_accepted: Arc<ShadowLogger>,
    pub get_rejected: Arc<ShadowLogger>,
    pub update_accepted: Arc<ShadowLogger>,
    pub update_rejected: Arc<ShadowLogger>,
    pub update_changes: Arc<ShadowLogger>,
    pub delete_accepted: Arc<ShadowLogger>,
    pub delete_rejected: Arc<ShadowLogger>,
}

impl ShadowHandlers {
    pub fn new() -> Self {
        Self {
            get_accepted: Arc::new(ShadowLogger::new("get-accepted")),
            get_rejected: Arc::new(ShadowLogger::new("get-rejected")),
            update_accepted: Arc::new(ShadowLogger::new("update-accepted")),
            update_rejected: Arc::new(ShadowLogger::new("update-rejected")),
            update_changes: Arc::new(ShadowLogger::new("update-changes")),
            delete_accepted: Arc::new(ShadowLogger::new("delete-accepted")),
            delete_rejected: Arc::new(ShadowLogger::new("delete-rejected")),
        }
    }

    pub fn for_topic(&self, topic: ShadowTopic) -> Arc<ShadowLogger> {
        let handler = match (topic.action(), topic.outcome()) {
            (ShadowAction::Get, ShadowOutcome::Accepted) => &self.get_accepted,
            (ShadowAction::Get, ShadowOutcome::Rejected) => &self.get_rejected,
            (ShadowAction::Update, ShadowOutcome::Accepted) => &self.update_accepted,
            (ShadowAction::Update, ShadowOutcome::Rejected) => &self.update_rejected,
            (ShadowAction::Delete, ShadowOutcome::Accepted) => &self.delete_accepted,
            (ShadowAction::Delete, ShadowOutcome::Rejected) => &self.delete_rejected,
            (_, ShadowOutcome::Delta | ShadowOutcome::Documents) => &self.update_changes,
        };
        Arc::clone(handler)
    }

    /// Subscribe every response topic of the client's thing.
    pub async fn register<C: Channel>(&self, client: &ShadowClient<C>) -> ShadowResult<()> {
        for topic in ShadowTopic::ALL {
            client
                .subscribe_shadow(topic.action(), topic.outcome(), self.for_topic(topic))
                .await?;
        }
        tracing::info!(topics = ShadowTopic::ALL.len(), "shadow handlers registered");
        Ok(())
    }
}

impl Default for ShadowHandlers {
    fn default() -> Self {
        Self::new()
    }
}
