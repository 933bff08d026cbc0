//! Device report payloads: initial reported state and sample messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::shadows::{ShadowDocument, StateMap};

/// Attributes reported on first connect when the config provides none.
pub fn default_attributes() -> StateMap {
    let value = json!({
        "location": {
            "country": "FR",
            "city": "Nantes"
        },
        "firmware-version": "1.8.3",
        "capabilities": {
            "network": "WIFI",
            "ble": true,
            "ota": true
        },
        "state": "ready"
    });
    match value {
        Value::Object(map) => map,
        _ => StateMap::new(),
    }
}

/// Build the initial `{"state":{"reported":{...}}}` report, stamped with
/// `at` in epoch milliseconds under `timestamp`.
pub fn initial_report(attributes: &StateMap, at: DateTime<Utc>) -> ShadowDocument {
    let mut reported = attributes.clone();
    reported.insert("timestamp".into(), json!(at.timestamp_millis()));
    ShadowDocument::reported(reported)
}

/// Message published periodically on the sample topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMessage {
    pub message: String,
}
