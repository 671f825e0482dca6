//! Transport seam between the connection manager and the socket library
//!
//! A [`Connector`] turns a URI into an open [`Socket`]: a sink of outbound
//! frames and a stream of inbound ones. The manager owns everything above
//! that (subscribe, retries, listeners).

pub mod memory;
mod websocket;

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

use crate::error::{ChannelError, Result};

pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
pub use tokio_tungstenite::tungstenite::protocol::CloseFrame;
pub use tokio_tungstenite::tungstenite::Message;
pub use websocket::TungsteniteConnector;

/// Send half of an open socket
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = ChannelError> + Send>>;

/// Receive half of an open socket
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message>> + Send>>;

/// An open socket; only constructed once the transport reports "open"
pub struct Socket {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Socket {
    pub fn new<S, R>(sink: S, stream: R) -> Self
    where
        S: Sink<Message, Error = ChannelError> + Send + 'static,
        R: Stream<Item = Result<Message>> + Send + 'static,
    {
        Self {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket").finish_non_exhaustive()
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a socket to `url`; resolves once the handshake completes
    async fn connect(&self, url: &str) -> Result<Socket>;
}
