//! Channel descriptors and the pub/sub wire format

mod protocol;
mod types;

pub use protocol::{channel_identifier, subscribe_command, subscribe_frame, CableCommand};
pub use types::{ChannelDescriptor, ConnectionId, ConnectionStatus, InboundFrame};
