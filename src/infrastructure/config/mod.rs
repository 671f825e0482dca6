mod settings;

pub use settings::{
    AuthConfig, LogConfig, PlatformConfig, SessionConfig, Settings, WebSocketConfig,
};
