//! Leaf adapters the connection manager consults before each attempt
//!
//! - `platform`: OS identifier and URI encoding
//! - `network`: optional reachability check
//! - `auth`: bearer token accessor

mod auth;
mod network;
mod platform;

pub use auth::{AuthTokenProvider, FnTokenProvider, StaticTokenProvider};
pub use network::{AlwaysReachable, NetworkReachability, NetworkState};
pub use platform::{build_connection_url, NativePlatform, PlatformAdapter, IOS};
