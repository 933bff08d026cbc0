//! MQTT session layer for ThingSync devices.
//!
//! - `IdentityContext` builds the mutual-TLS client configuration
//! - `Channel` trait for connect/publish/subscribe (mockable in tests)
//! - `MqttChannel` over rumqttc for production, `MockChannel` for tests
//! - `BrokerSession` routes inbound messages to per-topic handlers
//! - `ConnectionSupervisor` runs the JITP connect/retry state machine
//! - `ShadowClient` for device shadow requests and subscriptions

pub mod channel;
pub mod config;
pub mod error;
pub mod handler;
pub mod identity;
pub mod mock;
pub mod resources;
pub mod session;
pub mod shadows;
pub mod supervisor;

// Re-exports for convenience.
pub use channel::{Channel, MqttChannel};
pub use config::{IdentityConfig, MqttConfig, SessionConfig, TrustAnchorConfig};
pub use error::{
    ConnectError, ConnectFailure, CredentialError, MqttError, MqttResult, ShadowError,
    ShadowResult, SupervisorError,
};
pub use handler::{
    HandlerRegistry, InboundMessage, InboundReceiver, InboundSender, MessageHandler,
    inbound_channel,
};
pub use identity::{IdentityContext, ProtocolVersion};
pub use mock::MockChannel;
pub use resources::{FsResolver, ResourceResolver, StaticResolver};
pub use rumqttc::QoS;
pub use session::BrokerSession;
pub use shadows::ShadowClient;
pub use supervisor::{ConnectionState, ConnectionSupervisor, RetryCounter, RetryPolicy, transition};
