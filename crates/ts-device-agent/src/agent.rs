//! Agent orchestrator: connect, register handlers, report initial state.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::watch;

use ts_mqtt_channel::{
    BrokerSession, Channel, ConnectionState, ConnectionSupervisor, MqttError, MqttResult,
    RetryPolicy, ShadowClient, ShadowError, SupervisorError,
};
use ts_protocol::{StateMap, initial_report};

use crate::config::{AgentConfig, SampleConfig};
use crate::sample;
use crate::shadow_handlers::ShadowHandlers;

/// Why the agent failed to start.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Connection(#[from] SupervisorError),

    #[error("failed to subscribe sample topic: {0}")]
    Sample(#[from] MqttError),

    #[error("shadow setup failed: {0}")]
    Shadow(#[from] ShadowError),
}

/// Wires the session, supervisor and shadow client together.
pub struct Agent<C: Channel> {
    session: Arc<BrokerSession<C>>,
    supervisor: ConnectionSupervisor,
    shadows: ShadowClient<C>,
    handlers: ShadowHandlers,
    sample: SampleConfig,
    attributes: StateMap,
}

impl<C: Channel> Agent<C> {
    pub fn new(
        session: Arc<BrokerSession<C>>,
        policy: RetryPolicy,
        sample: SampleConfig,
        attributes: StateMap,
    ) -> Self {
        Self {
            shadows: ShadowClient::new(Arc::clone(&session)),
            session,
            supervisor: ConnectionSupervisor::new(policy),
            handlers: ShadowHandlers::new(),
            sample,
            attributes,
        }
    }

    pub fn from_config(session: Arc<BrokerSession<C>>, config: &AgentConfig) -> Self {
        Self::new(
            session,
            config.provisioning,
            config.sample.clone(),
            config.device.clone(),
        )
    }

    pub fn session(&self) -> &Arc<BrokerSession<C>> {
        &self.session
    }

    pub fn shadow_client(&self) -> &ShadowClient<C> {
        &self.shadows
    }

    pub fn handlers(&self) -> &ShadowHandlers {
        &self.handlers
    }

    pub fn state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.subscribe()
    }

    /// First connect, then subscriptions, then the initial report.
    ///
    /// A fatal connection failure is final: calling `start` again returns
    /// [`SupervisorError::Terminal`].
    pub async fn start(&self) -> Result<(), AgentError> {
        self.supervisor.establish(&self.session).await?;

        if self.sample.enabled {
            self.session
                .subscribe(&self.sample.topic, Arc::new(sample::log_sample))
                .await?;
        }
        self.handlers.register(&self.shadows).await?;
        self.report_initial_state().await?;

        tracing::info!(thing = %self.session.thing_name(), "agent started");
        Ok(())
    }

    /// Publish `{"state":{"reported":{...}}}` with the configured
    /// attributes and the current time.
    pub async fn report_initial_state(&self) -> Result<(), ShadowError> {
        let report = initial_report(&self.attributes, Utc::now());
        self.shadows.update_shadow(&report).await?;
        tracing::info!(attributes = self.attributes.len(), "initial state reported");
        Ok(())
    }

    /// Sample publisher loop; never returns. Pending forever when sampling
    /// is disabled.
    pub async fn run_sample_publisher(&self) {
        if !self.sample.enabled {
            return std::future::pending().await;
        }
        sample::run(&self.session, &self.sample.topic, self.sample.interval()).await;
    }

    pub async fn shutdown(&self) -> MqttResult<()> {
        self.session.disconnect().await?;
        tracing::info!("session closed");
        Ok(())
    }
}
