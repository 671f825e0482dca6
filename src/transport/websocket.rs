//! WebSocket connector backed by tokio-tungstenite

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tracing::debug;
use url::Url;

use super::{Connector, Socket};
use crate::error::{ChannelError, Result};

/// Connects over `ws://` or `wss://` (rustls with webpki roots)
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Socket> {
        let parsed = Url::parse(url).map_err(|e| ChannelError::InvalidUrl(e.to_string()))?;
        match parsed.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ChannelError::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        }

        debug!(host = ?parsed.host_str(), path = %parsed.path(), "Opening WebSocket");

        let (ws, response) = connect_async(url).await?;
        debug!(status = %response.status(), "WebSocket handshake complete");

        let (sink, stream) = ws.split();
        Ok(Socket::new(
            sink.sink_map_err(ChannelError::from),
            stream.map(|frame| frame.map_err(ChannelError::from)),
        ))
    }
}
