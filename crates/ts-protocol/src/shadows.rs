//! Shadow request envelope and broker response payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ShadowDocumentError;

/// Flat JSON object used for reported and desired state.
pub type StateMap = serde_json::Map<String, Value>;

/// The `state` section of a shadow request.
///
/// Modeled after AWS IoT Device Shadows: `reported` comes from the device,
/// `desired` is owned by the cloud.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reported: Option<StateMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desired: Option<StateMap>,
}

/// Shadow request envelope published by the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadowDocument {
    pub state: ShadowState,
    /// Echoed back by the broker on the matching accepted/rejected topic.
    #[serde(
        rename = "clientToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_token: Option<String>,
    /// Optimistic-locking version; the broker rejects mismatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ShadowDocument {
    /// A request reporting device state.
    pub fn reported(reported: StateMap) -> Self {
        Self {
            state: ShadowState {
                reported: Some(reported),
                desired: None,
            },
            ..Default::default()
        }
    }

    /// A request setting desired state.
    pub fn desired(desired: StateMap) -> Self {
        Self {
            state: ShadowState {
                reported: None,
                desired: Some(desired),
            },
            ..Default::default()
        }
    }

    pub fn with_client_token(mut self, token: impl Into<String>) -> Self {
        self.client_token = Some(token.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Reported and desired are never sent together: desired belongs to
    /// the broker side.
    pub fn validate(&self) -> Result<(), ShadowDocumentError> {
        if self.state.reported.is_some() && self.state.desired.is_some() {
            return Err(ShadowDocumentError::ReportedAndDesired);
        }
        Ok(())
    }

    /// Attach a fresh UUIDv7 client token unless one is already set.
    /// Returns the token in effect.
    pub fn ensure_client_token(&mut self) -> &str {
        self.client_token
            .get_or_insert_with(|| uuid::Uuid::now_v7().to_string())
    }
}

// ─── Broker responses ───
//
// The types below decode what the broker publishes on response topics.
// Routing never depends on them; handlers decode what they need.

/// Payload of `update/delta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowDelta {
    /// Fields where desired differs from reported.
    pub state: StateMap,
    pub version: u64,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Payload of any `*/rejected` topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<String>,
}

/// One side of an `update/documents` snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowSnapshot {
    #[serde(default)]
    pub state: ShadowState,
    #[serde(default)]
    pub metadata: Option<Value>,
    pub version: u64,
}

/// Payload of `update/documents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadowDocuments {
    #[serde(default)]
    pub previous: Option<ShadowSnapshot>,
    pub current: ShadowSnapshot,
    #[serde(default)]
    pub timestamp: i64,
    #[serde(rename = "clientToken", default)]
    pub client_token: Option<String>,
}

/// Extract `clientToken` from any response payload, for correlating a
/// response with the request that caused it.
pub fn client_token_of(payload: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(payload).ok()?;
    value
        .get("clientToken")
        .and_then(Value::as_str)
        .map(str::to_string)
}
