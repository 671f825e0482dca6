//! Connection manager for real-time channel subscriptions
//!
//! - `manager`: the public [`ChannelManager`] facade and its builder
//! - `lifecycle`: attempts, socket tasks and self-healing reconnect
//! - `retry`: bounded fixed-delay retry of failed attempts
//! - `registry`: shared state and the single-active-connection sweep
//! - `listeners`: per-id inbound frame fan-out

mod lifecycle;
mod listeners;
mod manager;
mod registry;
mod retry;
mod types;

pub use listeners::{listener, Listener};
pub use manager::{ChannelManager, ChannelManagerBuilder};
pub use retry::RetryPolicy;
pub use types::{ConnectOutcome, ManagerConfig, StatusSnapshot};
