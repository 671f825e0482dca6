//! Outbound command frames
//!
//! The subscribe command carries its channel identifier as a JSON string, not a
//! nested object: `{"command":"subscribe","identifier":"{\"channel\":...}"}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::types::ChannelDescriptor;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CableCommand {
    pub command: String,
    pub identifier: String,
}

/// Identifier JSON: `channel` first, then every param as a sibling key.
/// A `channel` param overrides the descriptor name.
pub fn channel_identifier(channel: &ChannelDescriptor) -> serde_json::Result<String> {
    let mut identifier = Map::with_capacity(channel.params.len() + 1);
    identifier.insert("channel".to_string(), Value::String(channel.name.clone()));
    for (key, value) in &channel.params {
        identifier.insert(key.clone(), value.clone());
    }
    serde_json::to_string(&identifier)
}

pub fn subscribe_command(channel: &ChannelDescriptor) -> serde_json::Result<CableCommand> {
    Ok(CableCommand {
        command: "subscribe".to_string(),
        identifier: channel_identifier(channel)?,
    })
}

/// Encoded subscribe frame sent once the transport opens
pub fn subscribe_frame(channel: &ChannelDescriptor) -> serde_json::Result<String> {
    serde_json::to_string(&subscribe_command(channel)?)
}
