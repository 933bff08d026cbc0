//! MQTT channel error types.

use std::fmt;

use thiserror::Error;
use ts_protocol::{InvalidShadowTopicError, ShadowDocumentError};

/// Errors that can occur during publish/subscribe operations.
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("session is not connected")]
    NotConnected,

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("disconnect error: {0}")]
    Disconnect(String),
}

/// Convenience alias for MQTT results.
pub type MqttResult<T> = Result<T, MqttError>;

/// Why a connect attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailure {
    /// The broker dropped the connection during the handshake. This is
    /// what an unprovisioned device sees while JITP runs server-side.
    ConnectionLost,
    /// A session is already open.
    AlreadyConnected,
    /// The broker refused the CONNECT (bad credentials, not authorized).
    Rejected,
    /// No CONNACK within the configured connect timeout.
    Timeout,
    /// Any other TLS or MQTT protocol failure.
    Protocol,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ConnectionLost => "connection lost",
            Self::AlreadyConnected => "already connected",
            Self::Rejected => "rejected",
            Self::Timeout => "timeout",
            Self::Protocol => "protocol error",
        };
        f.write_str(s)
    }
}

/// A classified connect failure.
#[derive(Debug, Clone, Error)]
#[error("connect failed ({cause}): {message}")]
pub struct ConnectError {
    pub cause: ConnectFailure,
    pub message: String,
}

impl ConnectError {
    pub fn new(cause: ConnectFailure, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    pub fn already_connected() -> Self {
        Self::new(ConnectFailure::AlreadyConnected, "a session is already open")
    }

    /// Only a connection dropped mid-handshake is worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.cause == ConnectFailure::ConnectionLost
    }

    pub fn is_already_connected(&self) -> bool {
        self.cause == ConnectFailure::AlreadyConnected
    }
}

/// Failures while building the TLS identity. Always fatal at startup.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential '{name}' not found at '{locator}'")]
    NotFound { name: String, locator: String },

    #[error("failed to read credential '{name}' from '{locator}': {reason}")]
    Unreadable {
        name: String,
        locator: String,
        reason: String,
    },

    #[error("invalid certificate '{name}': {reason}")]
    InvalidCertificate { name: String, reason: String },

    #[error("invalid private key '{name}': {reason}")]
    InvalidKey { name: String, reason: String },

    #[error("no private key found in '{name}'")]
    MissingPrivateKey { name: String },

    #[error("trust anchor name '{0}' is configured twice")]
    DuplicateTrustAnchor(String),

    #[error("at least one trusted server root is required")]
    NoTrustAnchors,

    #[error("TLS configuration rejected the device credentials: {0}")]
    Tls(String),
}

/// Terminal outcome of the connection supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(
        "device provisioning failed: broker kept dropping the connection after {attempts} retries"
    )]
    ProvisioningExhausted {
        attempts: u32,
        #[source]
        last: ConnectError,
    },

    #[error("broker connection failed and will not be retried")]
    Rejected(#[source] ConnectError),

    #[error("connection supervisor already reached a fatal failure")]
    Terminal,
}

/// Errors raised by shadow requests and subscriptions.
#[derive(Debug, Error)]
pub enum ShadowError {
    #[error(transparent)]
    InvalidTopic(#[from] InvalidShadowTopicError),

    #[error(transparent)]
    Document(#[from] ShadowDocumentError),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Transport(#[from] MqttError),
}

/// Convenience alias for shadow results.
pub type ShadowResult<T> = Result<T, ShadowError>;
