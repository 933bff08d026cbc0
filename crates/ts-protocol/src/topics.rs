//! MQTT topic builders and parsers for the device shadow hierarchy.
//!
//! Topic structure:
//! ```text
//! $aws/things/{thing_name}/shadow/{action}
//! $aws/things/{thing_name}/shadow/{action}/{outcome}
//! ```
//!
//! Requests are published to the bare action topic; the broker answers on
//! one of the eight reserved response topics.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidShadowTopicError, UnknownSegmentError};

const PREFIX: &str = "$aws/things";
const SHADOW: &str = "shadow";

// ─── Actions & outcomes ───

/// Shadow request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowAction {
    Get,
    Update,
    Delete,
}

impl ShadowAction {
    pub const ALL: [ShadowAction; 3] = [Self::Get, Self::Update, Self::Delete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for ShadowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowAction {
    type Err = UnknownSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "get" => Ok(Self::Get),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(UnknownSegmentError {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

/// Broker response kind for a shadow request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowOutcome {
    /// The request was applied.
    Accepted,
    /// The request was refused; the payload carries an error code.
    Rejected,
    /// Only the fields where desired differs from reported.
    Delta,
    /// Full previous/current snapshot after a successful update.
    Documents,
}

impl ShadowOutcome {
    pub const ALL: [ShadowOutcome; 4] = [
        Self::Accepted,
        Self::Rejected,
        Self::Delta,
        Self::Documents,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Delta => "delta",
            Self::Documents => "documents",
        }
    }
}

impl fmt::Display for ShadowOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShadowOutcome {
    type Err = UnknownSegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "delta" => Ok(Self::Delta),
            "documents" => Ok(Self::Documents),
            other => Err(UnknownSegmentError {
                kind: "outcome",
                value: other.to_string(),
            }),
        }
    }
}

// ─── ShadowTopic ───

/// A valid (action, outcome) pair. Only eight of the twelve combinations
/// have a reserved response topic; construction enforces that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShadowTopic {
    action: ShadowAction,
    outcome: ShadowOutcome,
}

impl ShadowTopic {
    /// Every pair with a reserved response topic.
    pub const ALL: [ShadowTopic; 8] = [
        Self::pair(ShadowAction::Get, ShadowOutcome::Accepted),
        Self::pair(ShadowAction::Get, ShadowOutcome::Rejected),
        Self::pair(ShadowAction::Update, ShadowOutcome::Accepted),
        Self::pair(ShadowAction::Update, ShadowOutcome::Rejected),
        Self::pair(ShadowAction::Update, ShadowOutcome::Delta),
        Self::pair(ShadowAction::Update, ShadowOutcome::Documents),
        Self::pair(ShadowAction::Delete, ShadowOutcome::Accepted),
        Self::pair(ShadowAction::Delete, ShadowOutcome::Rejected),
    ];

    const fn pair(action: ShadowAction, outcome: ShadowOutcome) -> Self {
        Self { action, outcome }
    }

    /// Validate an (action, outcome) pair.
    pub fn new(
        action: ShadowAction,
        outcome: ShadowOutcome,
    ) -> Result<Self, InvalidShadowTopicError> {
        if Self::is_valid(action, outcome) {
            Ok(Self { action, outcome })
        } else {
            Err(InvalidShadowTopicError { action, outcome })
        }
    }

    /// Delta and documents are only ever published for updates.
    pub fn is_valid(action: ShadowAction, outcome: ShadowOutcome) -> bool {
        match outcome {
            ShadowOutcome::Accepted | ShadowOutcome::Rejected => true,
            ShadowOutcome::Delta | ShadowOutcome::Documents => action == ShadowAction::Update,
        }
    }

    pub fn action(&self) -> ShadowAction {
        self.action
    }

    pub fn outcome(&self) -> ShadowOutcome {
        self.outcome
    }

    /// The response topic for this pair under `thing_name`.
    pub fn topic(&self, thing_name: &str) -> String {
        shadow_response(thing_name, *self)
    }
}

impl fmt::Display for ShadowTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.action, self.outcome)
    }
}

// ─── Topic builders ───

/// Request topic for `action` (e.g. `$aws/things/dev1/shadow/update`).
pub fn shadow_request(thing_name: &str, action: ShadowAction) -> String {
    format!("{PREFIX}/{thing_name}/{SHADOW}/{action}")
}

/// Response topic for a validated pair.
pub fn shadow_response(thing_name: &str, topic: ShadowTopic) -> String {
    format!(
        "{PREFIX}/{thing_name}/{SHADOW}/{}/{}",
        topic.action, topic.outcome
    )
}

/// Subscribe to every shadow response for a thing.
pub fn shadow_subscribe_all(thing_name: &str) -> String {
    format!("{PREFIX}/{thing_name}/{SHADOW}/+/+")
}

// ─── Topic parsing ───

/// Parsed shadow response topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedShadowTopic {
    pub thing_name: String,
    pub topic: ShadowTopic,
}

/// Parse a response topic back into its thing name and (action, outcome).
/// Returns `None` for request topics, foreign topics and invalid pairs.
pub fn parse_shadow_topic(topic: &str) -> Option<ParsedShadowTopic> {
    let rest = topic.strip_prefix(PREFIX)?.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();

    let [thing_name, shadow, action, outcome] = parts.as_slice() else {
        return None;
    };
    if *shadow != SHADOW || thing_name.is_empty() {
        return None;
    }

    let action = action.parse().ok()?;
    let outcome = outcome.parse().ok()?;
    let topic = ShadowTopic::new(action, outcome).ok()?;

    Some(ParsedShadowTopic {
        thing_name: thing_name.to_string(),
        topic,
    })
}
