// Infrastructure layer (shared components)
pub mod infrastructure;

pub use infrastructure::config;
pub use infrastructure::error;
pub use infrastructure::metrics;

// Adapters and wire format
pub mod adapters;
pub mod channel;
pub mod transport;

// Connection management
pub mod connection_manager;

// Supporting modules
pub mod telemetry;

pub use connection_manager::{listener, ChannelManager, ConnectOutcome, Listener, ManagerConfig};
