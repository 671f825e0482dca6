//! Manager configuration, connect outcomes and status snapshots

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;

use super::retry::RetryPolicy;
use crate::channel::{ChannelDescriptor, ConnectionId, ConnectionStatus};
use crate::config::WebSocketConfig;

/// Runtime configuration of a [`ChannelManager`](super::ChannelManager)
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Base WebSocket URL; the token query parameter is appended per attempt
    pub url: String,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub reconnect_channel: String,
    pub reconnect_id_param: String,
}

impl ManagerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self::from(&WebSocketConfig {
            url: url.into(),
            ..WebSocketConfig::default()
        })
    }

    /// Descriptor used by the self-healing reconnect for `id`
    pub fn reconnect_descriptor(&self, id: ConnectionId) -> ChannelDescriptor {
        ChannelDescriptor::new(self.reconnect_channel.clone())
            .with_param(self.reconnect_id_param.clone(), id)
    }
}

impl From<&WebSocketConfig> for ManagerConfig {
    fn from(config: &WebSocketConfig) -> Self {
        Self {
            url: config.url.clone(),
            connect_timeout: config.connect_timeout(),
            retry: RetryPolicy::new(config.max_retry_attempts, config.retry_delay()),
            poll_interval: config.poll_interval(),
            wait_timeout: config.wait_timeout(),
            reconnect_channel: config.reconnect_channel.clone(),
            reconnect_id_param: config.reconnect_id_param.clone(),
        }
    }
}

/// How the first attempt of a `connect` call resolved.
///
/// Informational only: retries and reconnects continue regardless of whether
/// anyone awaits the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Socket opened and subscribe frame sent
    Connected,
    /// A handshake for the same id and channel was already running; the sweep
    /// still ran and that handshake carries on
    AlreadyAttempting,
    /// No token available; status is `error`, no retry
    Unauthenticated,
    /// Network adapter reported no connectivity; status is `disconnected`, no retry
    Unreachable,
    /// Attempt failed; bounded retries are scheduled when the failure allows it
    Failed,
    /// A newer connect or close displaced this attempt
    Superseded,
}

/// Who asked for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Caller,
    Reconnect,
}

/// Observable per-id state, republished on every transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: HashMap<ConnectionId, ConnectionStatus>,
    pub retry_count: HashMap<ConnectionId, u32>,
}

impl StatusSnapshot {
    pub fn status_of(&self, id: ConnectionId) -> Option<ConnectionStatus> {
        self.status.get(&id).copied()
    }

    pub fn retries_of(&self, id: ConnectionId) -> u32 {
        self.retry_count.get(&id).copied().unwrap_or(0)
    }

    /// Ids whose status is `connected`
    pub fn connected_ids(&self) -> Vec<ConnectionId> {
        self.status
            .iter()
            .filter(|(_, status)| **status == ConnectionStatus::Connected)
            .map(|(id, _)| *id)
            .collect()
    }
}
