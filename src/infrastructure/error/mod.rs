use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("No auth token available")]
    Unauthenticated,

    #[error("Network unreachable")]
    Unreachable,

    #[error("Connection attempt timed out after {0} ms")]
    Timeout(u64),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("Connection closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ChannelError {
    /// Short machine-readable code, used as a metric label
    pub fn code(&self) -> &'static str {
        match self {
            ChannelError::Config(_) => "config",
            ChannelError::Unauthenticated => "unauthenticated",
            ChannelError::Unreachable => "unreachable",
            ChannelError::Timeout(_) => "timeout",
            ChannelError::Handshake(_) => "handshake",
            ChannelError::Transport(_) => "transport",
            ChannelError::Closed => "closed",
            ChannelError::Serialization(_) => "serialization",
            ChannelError::InvalidUrl(_) => "invalid_url",
        }
    }

    /// Whether the bounded retry policy applies to this failure
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::Timeout(_)
                | ChannelError::Handshake(_)
                | ChannelError::Transport(_)
                | ChannelError::Closed
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
