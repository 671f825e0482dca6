//! In-memory connector for exercising the manager without a network.
//!
//! Each accepted connection yields a [`MemoryPeer`], the server side of the
//! socket, which tests use to read client frames, push inbound frames or
//! drop the connection.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc as frame_channel;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use super::{Connector, Message, Socket};
use crate::error::{ChannelError, Result};

/// How the connector answers one connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectBehavior {
    /// Open the socket
    Accept,
    /// Fail the handshake immediately
    Refuse,
    /// Never resolve (exercises the attempt timeout)
    Hang,
}

pub struct MemoryConnector {
    default: ConnectBehavior,
    script: Mutex<VecDeque<ConnectBehavior>>,
    attempts: AtomicUsize,
    urls: Mutex<Vec<String>>,
    peer_tx: mpsc::UnboundedSender<MemoryPeer>,
    peer_rx: AsyncMutex<mpsc::UnboundedReceiver<MemoryPeer>>,
}

impl MemoryConnector {
    pub fn new(default: ConnectBehavior) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        Self {
            default,
            script: Mutex::new(VecDeque::new()),
            attempts: AtomicUsize::new(0),
            urls: Mutex::new(Vec::new()),
            peer_tx,
            peer_rx: AsyncMutex::new(peer_rx),
        }
    }

    pub fn accepting() -> Self {
        Self::new(ConnectBehavior::Accept)
    }

    pub fn refusing() -> Self {
        Self::new(ConnectBehavior::Refuse)
    }

    pub fn hanging() -> Self {
        Self::new(ConnectBehavior::Hang)
    }

    /// Answer the next attempts in order, then fall back to the default
    pub fn with_script(self, behaviors: impl IntoIterator<Item = ConnectBehavior>) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(behaviors);
        self
    }

    /// Number of times `connect` has been called
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// URLs passed to `connect`, in order
    pub fn urls(&self) -> Vec<String> {
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Server side of the next accepted connection
    pub async fn next_peer(&self) -> Option<MemoryPeer> {
        self.peer_rx.lock().await.recv().await
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Socket> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.urls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let behavior = {
            let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
            script.pop_front().unwrap_or(self.default)
        };

        match behavior {
            ConnectBehavior::Refuse => {
                Err(ChannelError::Handshake("connection refused".to_string()))
            }
            ConnectBehavior::Hang => futures::future::pending().await,
            ConnectBehavior::Accept => {
                let (client_tx, server_rx) = frame_channel::unbounded::<Message>();
                let (server_tx, client_rx) = frame_channel::unbounded::<Result<Message>>();

                let peer = MemoryPeer {
                    url: url.to_string(),
                    received: server_rx,
                    outbound: Some(server_tx),
                };
                let _ = self.peer_tx.send(peer);

                Ok(Socket::new(
                    client_tx.sink_map_err(|_| ChannelError::Closed),
                    client_rx,
                ))
            }
        }
    }
}

/// Server side of an in-memory socket
pub struct MemoryPeer {
    url: String,
    received: frame_channel::UnboundedReceiver<Message>,
    outbound: Option<frame_channel::UnboundedSender<Result<Message>>>,
}

impl MemoryPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Push a text frame to the client
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.push(Ok(Message::Text(text.into())))
    }

    /// Push a binary frame to the client
    pub fn send_binary(&self, data: Vec<u8>) -> bool {
        self.push(Ok(Message::Binary(data)))
    }

    /// Surface a transport error on the client's stream
    pub fn send_error(&self) -> bool {
        self.push(Err(ChannelError::Closed))
    }

    fn push(&self, frame: Result<Message>) -> bool {
        self.outbound
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(frame).is_ok())
    }

    /// Next frame written by the client; `None` once the client hung up
    pub async fn recv(&mut self) -> Option<Message> {
        self.received.next().await
    }

    /// Drop the connection from the server side
    pub fn disconnect(&mut self) {
        self.outbound.take();
    }
}
