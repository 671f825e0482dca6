//! Bounded, fixed-delay retry for failed initial attempts.
//!
//! Only handshake failures and timeouts are retried. A connection that opened
//! and later dropped goes through the self-healing reconnect instead and never
//! touches the retry counter.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;

use super::lifecycle::{AttemptResult, Opened};
use super::manager::Shared;
use super::types::ConnectOutcome;
use crate::channel::{ChannelDescriptor, ConnectionId, ConnectionStatus};
use crate::error::ChannelError;
use crate::metrics::ChannelMetrics;

/// Retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Retries allowed after the initial attempt
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Delay before retry number `attempt` (1-based), or `None` once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt <= self.max_attempts).then_some(self.delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000))
    }
}

/// The one pending retry for an id
#[derive(Debug)]
pub(crate) struct RetryTimer {
    epoch: u64,
    attempt: u32,
    handle: AbortHandle,
}

impl RetryTimer {
    pub fn new(epoch: u64, attempt: u32, handle: AbortHandle) -> Self {
        Self {
            epoch,
            attempt,
            handle,
        }
    }

    pub fn matches(&self, epoch: u64, attempt: u32) -> bool {
        self.epoch == epoch && self.attempt == attempt
    }

    pub fn cancel(self) {
        self.handle.abort();
    }
}

impl Shared {
    /// Turn an attempt result into an outcome, scheduling a retry when allowed.
    /// `completed` is the retry number that produced `result` (0 for the initial attempt).
    pub(crate) fn settle(
        self: &Arc<Self>,
        id: ConnectionId,
        channel: ChannelDescriptor,
        epoch: u64,
        completed: u32,
        result: AttemptResult,
    ) -> ConnectOutcome {
        let error = match result {
            Ok(Opened::Registered) => return ConnectOutcome::Connected,
            Ok(Opened::Superseded) => return ConnectOutcome::Superseded,
            Err(e) => e,
        };

        ChannelMetrics::record_failure(error.code());

        if !error.is_retryable() {
            tracing::warn!(
                connection_id = id,
                channel = %channel.name,
                error = %error,
                "Connection attempt failed, not retrying"
            );
            self.lock().finish_attempt(id, epoch);
            return match error {
                ChannelError::Unauthenticated => ConnectOutcome::Unauthenticated,
                ChannelError::Unreachable => ConnectOutcome::Unreachable,
                _ => ConnectOutcome::Failed,
            };
        }

        tracing::warn!(
            connection_id = id,
            channel = %channel.name,
            attempt = completed,
            error = %error,
            "Connection attempt failed"
        );
        self.schedule_retry(id, channel, epoch, completed);
        ConnectOutcome::Failed
    }

    fn schedule_retry(
        self: &Arc<Self>,
        id: ConnectionId,
        channel: ChannelDescriptor,
        epoch: u64,
        completed: u32,
    ) {
        let mut registry = self.lock();
        if !registry.is_current(id, epoch) {
            return;
        }

        let next = completed + 1;
        match self.config.retry.delay_for(next) {
            Some(delay) => {
                let shared = self.clone();
                // Spawned under the lock so the timer is registered before it can fire
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.fire_retry(id, channel, epoch, next).await;
                });
                registry.replace_retry_timer(id, RetryTimer::new(epoch, next, task.abort_handle()));
                ChannelMetrics::record_retry_scheduled();
                tracing::debug!(
                    connection_id = id,
                    attempt = next,
                    delay_ms = delay.as_millis() as u64,
                    "Retry scheduled"
                );
            }
            None => {
                registry.finish_attempt(id, epoch);
                registry.set_status(id, ConnectionStatus::Error);
                ChannelMetrics::record_retries_exhausted();
                tracing::error!(
                    connection_id = id,
                    channel = %channel.name,
                    attempts = completed + 1,
                    "Retries exhausted, giving up"
                );
            }
        }
    }

    async fn fire_retry(
        self: Arc<Self>,
        id: ConnectionId,
        channel: ChannelDescriptor,
        epoch: u64,
        attempt: u32,
    ) {
        {
            let mut registry = self.lock();
            if !registry.take_retry_timer(id, epoch, attempt) || !registry.is_current(id, epoch) {
                tracing::debug!(connection_id = id, attempt, "Stale retry timer ignored");
                return;
            }
            registry.set_retry_count(id, attempt);
        }

        tracing::info!(
            connection_id = id,
            channel = %channel.name,
            attempt,
            "Retrying connection"
        );
        let result = self.attempt(id, &channel, epoch).await;
        self.settle(id, channel, epoch, attempt, result);
    }
}
