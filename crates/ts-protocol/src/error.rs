//! Protocol-level error types.

use thiserror::Error;

use crate::topics::{ShadowAction, ShadowOutcome};

/// An (action, outcome) pair with no reserved shadow topic.
///
/// Raised before anything touches the transport; it always indicates a
/// programming error in the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid shadow topic: ({action}, {outcome}) has no reserved topic")]
pub struct InvalidShadowTopicError {
    pub action: ShadowAction,
    pub outcome: ShadowOutcome,
}

/// A topic segment that does not name a known action or outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown shadow {kind} '{value}'")]
pub struct UnknownSegmentError {
    pub kind: &'static str,
    pub value: String,
}

/// Violations of the shadow request envelope rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShadowDocumentError {
    #[error("shadow request carries both reported and desired state")]
    ReportedAndDesired,
}
