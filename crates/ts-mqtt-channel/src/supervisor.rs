//! Just-in-time provisioning (JITP) connect/retry state machine.
//!
//! An unprovisioned device's first TLS handshake makes the broker register
//! its certificate asynchronously and drop the connection. The supervisor
//! retries with a linearly growing wait (`attempt × base_delay`) a bounded
//! number of times, then gives up for good.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;

use crate::channel::Channel;
use crate::error::{ConnectError, ConnectFailure, SupervisorError};
use crate::session::BrokerSession;

/// Lifecycle of the agent's broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    ProvisioningRetry,
    Connected,
    FatalFailure,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ProvisioningRetry => "provisioning-retry",
            Self::Connected => "connected",
            Self::FatalFailure => "fatal-failure",
        };
        f.write_str(s)
    }
}

/// Retries spent in the current provisioning episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryCounter {
    attempt: u32,
    max_attempts: u32,
}

impl RetryCounter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt: 0,
            max_attempts,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Start the next retry. Returns its 1-based number.
    pub fn advance(&mut self) -> u32 {
        self.attempt += 1;
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Whether another retry may follow the current one.
    pub fn has_budget(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Wait before the current retry: `attempt × base`.
    pub fn backoff(&self, base: Duration) -> Duration {
        base.saturating_mul(self.attempt)
    }
}

/// Bounds of the provisioning retry loop, loadable from TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// Next state after a connect attempt made in `state`.
///
/// `counter` holds the number of the retry that produced `outcome` (0 for
/// the first connect).
pub fn transition(
    state: ConnectionState,
    counter: &RetryCounter,
    outcome: Result<(), ConnectFailure>,
) -> ConnectionState {
    use ConnectionState::*;

    match (state, outcome) {
        (FatalFailure, _) => FatalFailure,
        (_, Ok(())) | (_, Err(ConnectFailure::AlreadyConnected)) => Connected,
        (ProvisioningRetry, Err(ConnectFailure::ConnectionLost)) if counter.has_budget() => {
            ProvisioningRetry
        }
        (ProvisioningRetry, Err(ConnectFailure::ConnectionLost)) => FatalFailure,
        (_, Err(ConnectFailure::ConnectionLost)) if counter.max_attempts() > 0 => {
            ProvisioningRetry
        }
        (_, Err(_)) => FatalFailure,
    }
}

/// Drives a [`BrokerSession`] to `Connected` or to a terminal failure.
pub struct ConnectionSupervisor {
    policy: RetryPolicy,
    state: watch::Sender<ConnectionState>,
}

impl ConnectionSupervisor {
    pub fn new(policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { policy, state }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    /// Connect, retrying while the broker provisions the device.
    ///
    /// Once this has returned a fatal error every later call returns
    /// [`SupervisorError::Terminal`] without touching the transport.
    pub async fn establish<C: Channel>(
        &self,
        session: &BrokerSession<C>,
    ) -> Result<(), SupervisorError> {
        if self.state() == ConnectionState::FatalFailure {
            return Err(SupervisorError::Terminal);
        }

        let mut counter = RetryCounter::new(self.policy.max_attempts);
        self.set_state(ConnectionState::Connecting);
        tracing::info!(thing = %session.thing_name(), "connecting to broker");
        let mut result = session.connect().await;

        loop {
            let outcome = match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(e.cause),
            };
            let next = transition(self.state(), &counter, outcome);
            self.set_state(next);

            match (next, result) {
                (ConnectionState::ProvisioningRetry, Err(err)) => {
                    let attempt = counter.advance();
                    let delay = counter.backoff(self.policy.base_delay());
                    tracing::warn!(
                        attempt,
                        max_attempts = counter.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connection lost during handshake, waiting for provisioning"
                    );
                    tokio::time::sleep(delay).await;
                    result = session.connect().await;
                }
                (ConnectionState::FatalFailure, Err(last)) => {
                    return Err(self.fatal(&counter, last));
                }
                (_, result) => {
                    if let Err(err) = result {
                        tracing::warn!(
                            error = %err,
                            "broker reports an open session; continuing without a fresh handshake"
                        );
                    }
                    if counter.attempt() > 0 {
                        tracing::info!(retries = counter.attempt(), "device provisioned");
                    }
                    counter.reset();
                    tracing::info!(thing = %session.thing_name(), "connected to broker");
                    return Ok(());
                }
            }
        }
    }

    fn fatal(&self, counter: &RetryCounter, last: ConnectError) -> SupervisorError {
        if last.is_retryable() {
            tracing::error!(
                attempts = counter.attempt(),
                error = %last,
                "device provisioning failed, giving up"
            );
            SupervisorError::ProvisioningExhausted {
                attempts: counter.attempt(),
                last,
            }
        } else {
            tracing::error!(error = %last, "broker connection failed, not retrying");
            SupervisorError::Rejected(last)
        }
    }
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
