//! # Reconnection Manager
//!
//! Connection state machine and backoff policy for the transport.
//!
//! `CONNECTED -> RECONNECTING` on transport drop, `RECONNECTING -> CONNECTED`
//! when a retry succeeds, `RECONNECTING -> DEGRADED` after enough consecutive
//! failures. Retries continue at the capped interval while degraded, but
//! every attempt is made from `RECONNECTING`: the state moves
//! `DEGRADED -> RECONNECTING` before each retry and back to `DEGRADED` if it
//! fails. `retry_now` wakes the backoff sleep early and restarts the backoff
//! at the base delay.
//!
//! The transport offers no replay buffer, so the caller (dispatch loop)
//! performs a full resync after every successful reconnect.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::time::sleep;

use crate::observability::{Logger, MetricsRegistry};

use super::errors::{SyncError, SyncResult};
use super::transport::{ConnectionState, Transport};

/// Backoff parameters for reconnect attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// First retry delay; doubles on each failure
    pub base: Duration,

    /// Upper bound on the retry delay
    pub max: Duration,

    /// Consecutive failures before the state becomes `Degraded`
    pub degraded_after: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(250),
            max: Duration::from_secs(30),
            degraded_after: 5,
        }
    }
}

impl ReconnectPolicy {
    /// Validate the policy
    pub fn validate(&self) -> SyncResult<()> {
        if self.base.is_zero() {
            return Err(SyncError::config("reconnect base delay must be non-zero"));
        }
        if self.base > self.max {
            return Err(SyncError::config(format!(
                "reconnect base ({:?}) must not exceed max ({:?})",
                self.base, self.max
            )));
        }
        if self.degraded_after == 0 {
            return Err(SyncError::config("degraded_after must be at least 1"));
        }
        Ok(())
    }
}

/// Drives reconnect attempts and publishes the connection state
pub struct ReconnectionManager {
    policy: ReconnectPolicy,
    state_tx: watch::Sender<ConnectionState>,
    retry: Notify,
    metrics: Arc<MetricsRegistry>,
}

impl ReconnectionManager {
    /// Create a manager in the `Connected` state
    pub fn new(policy: ReconnectPolicy, metrics: Arc<MetricsRegistry>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Connected);
        Self {
            policy,
            state_tx,
            retry: Notify::new(),
            metrics,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions (for UI banners)
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Wake a pending backoff sleep and restart the backoff at the base
    /// delay; the attempt it triggers is made from `Reconnecting`
    pub fn retry_now(&self) {
        self.retry.notify_one();
    }

    /// Retry `transport.reconnect()` with exponential backoff until it
    /// succeeds, then return with the state set to `Connected`.
    pub async fn reestablish(&self, transport: &dyn Transport) {
        self.set_state(ConnectionState::Reconnecting);

        let mut failures: u32 = 0;
        let mut delay = self.policy.base;

        loop {
            // Every attempt is made from Reconnecting; a degraded manager
            // re-enters it for the retry and drops back on failure.
            if self.state() == ConnectionState::Degraded {
                self.set_state(ConnectionState::Reconnecting);
            }
            self.metrics.incr_reconnect_attempts();
            match transport.reconnect() {
                Ok(()) => {
                    self.metrics.incr_reconnects();
                    self.set_state(ConnectionState::Connected);
                    return;
                }
                Err(err) => {
                    failures += 1;
                    Logger::warn(
                        "RECONNECT_FAILED",
                        &[
                            ("attempt", &failures.to_string()),
                            ("error", &err.to_string()),
                        ],
                    );
                    if failures >= self.policy.degraded_after {
                        self.set_state(ConnectionState::Degraded);
                    }

                    tokio::select! {
                        _ = sleep(Self::jittered(delay)) => {
                            delay = (delay * 2).min(self.policy.max);
                        }
                        _ = self.retry.notified() => {
                            delay = self.policy.base;
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state();
        if prev != next {
            Logger::info(
                "CONNECTION_STATE",
                &[("from", prev.as_str()), ("to", next.as_str())],
            );
            // send_replace stores the value even with no live receivers
            self.state_tx.send_replace(next);
        }
    }

    /// Multiplicative jitter in [0.5, 1.0) keeps concurrent clients from
    /// retrying in lockstep
    fn jittered(delay: Duration) -> Duration {
        let factor = rand::thread_rng().gen_range(0.5..1.0);
        delay.mul_f64(factor)
    }
}
