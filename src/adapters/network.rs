//! Network reachability checked before every connection attempt

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Snapshot of the device's network state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkState {
    pub is_connected: bool,
    /// `None` when the platform cannot tell
    pub is_internet_reachable: Option<bool>,
}

impl NetworkState {
    pub fn online() -> Self {
        Self {
            is_connected: true,
            is_internet_reachable: Some(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            is_connected: false,
            is_internet_reachable: Some(false),
        }
    }

    /// Usable unless disconnected or explicitly reported unreachable
    pub fn is_usable(&self) -> bool {
        self.is_connected && self.is_internet_reachable != Some(false)
    }
}

#[async_trait]
pub trait NetworkReachability: Send + Sync {
    async fn fetch(&self) -> NetworkState;
}

/// Adapter that always reports an online network
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysReachable;

#[async_trait]
impl NetworkReachability for AlwaysReachable {
    async fn fetch(&self) -> NetworkState {
        NetworkState::online()
    }
}
