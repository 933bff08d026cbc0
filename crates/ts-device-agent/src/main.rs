//! ThingSync device agent: keeps a device's broker shadow in sync.
//!
//! Builds the mutual-TLS identity, connects through the JITP retry loop,
//! registers the shadow handlers and reports the initial device state.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use ts_device_agent::{Agent, AgentConfig};
use ts_mqtt_channel::{
    BrokerSession, FsResolver, IdentityContext, MqttChannel, SessionConfig, inbound_channel,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "ts-device-agent starting"
    );

    // ── Load config ─────────────────────────────────────────────
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/thingsync/agent.toml".to_string());

    let config = AgentConfig::from_file(&config_path)?;
    tracing::info!(
        thing = %config.thing_name,
        broker = %config.mqtt.broker_host,
        "config loaded"
    );

    // ── Identity ────────────────────────────────────────────────
    let resolver = FsResolver::new(config.resource_dir(&config_path));
    let identity = IdentityContext::build(&config.identity, &resolver)?;
    tracing::info!(
        trust_anchors = ?identity.trust_anchors(),
        protocol = %identity.protocol_version(),
        "identity loaded"
    );

    // ── Broker session ──────────────────────────────────────────
    let session_config = SessionConfig::new(&config.mqtt, &config.thing_name, identity);
    let (inbound_tx, inbound_rx) = inbound_channel();
    let channel = Arc::new(MqttChannel::new(session_config, inbound_tx));
    let session = Arc::new(BrokerSession::new(channel, &config.thing_name));

    let dispatcher = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.run_dispatch(inbound_rx).await })
    };

    // ── Agent ───────────────────────────────────────────────────
    let agent = Agent::from_config(session, &config);
    agent.start().await?;

    tracing::info!("ts-device-agent ready");

    tokio::select! {
        // Publish periodic sample messages
        () = agent.run_sample_publisher() => {
            tracing::error!("sample publisher exited unexpectedly");
        }
        // Graceful shutdown on SIGINT
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    if let Err(e) = agent.shutdown().await {
        tracing::warn!(error = %e, "disconnect failed");
    }
    dispatcher.abort();

    tracing::info!("ts-device-agent stopped");
    Ok(())
}
