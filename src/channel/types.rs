//! Channel descriptors, connection ids and frames

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Caller-chosen key scoping one physical connection, its listeners and timers
pub type ConnectionId = u64;

/// Server-side channel to subscribe to, with its subscription params
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
    Error,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame received from the server, passed to listeners verbatim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl InboundFrame {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InboundFrame::Text(text) => Some(text),
            InboundFrame::Binary(_) => None,
        }
    }

    /// Decode the frame body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            InboundFrame::Text(text) => serde_json::from_str(text),
            InboundFrame::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}
