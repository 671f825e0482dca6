//! Connection lifecycle: attempt, open, read/write tasks and self-healing reconnect.
//!
//! ```text
//! idle ──connect──▶ attempting ──open──▶ open ──close──▶ closed ──reconnect──▶ attempting
//!                       │                  │
//!                       └──fail──▶ retry   └──error──▶ errored
//! ```
//!
//! Every attempt carries the epoch it was started in. A sweep bumps the epoch,
//! so an attempt that resolves afterwards can neither publish status nor
//! register its socket.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::listeners::deliver;
use super::manager::Shared;
use super::registry::{ConnectionRecord, Outbound};
use super::types::{ConnectOutcome, Origin};
use crate::adapters::build_connection_url;
use crate::channel::{subscribe_frame, ChannelDescriptor, ConnectionId, ConnectionStatus, InboundFrame};
use crate::error::{ChannelError, Result};
use crate::metrics::ChannelMetrics;
use crate::transport::{CloseCode, CloseFrame, FrameSink, FrameStream, Message, Socket};

pub(crate) type AttemptResult = Result<Opened>;

/// How a successful handshake ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Opened {
    /// Socket registered as the live connection for its id
    Registered,
    /// A sweep or close happened while connecting; the socket was closed again
    Superseded,
}

impl Shared {
    /// Sweep, then spawn the initial attempt for `id`.
    ///
    /// The sweep runs before this returns, so callers can register listeners
    /// for the new connection right away.
    pub(crate) fn start(
        self: &Arc<Self>,
        id: ConnectionId,
        channel: ChannelDescriptor,
        origin: Origin,
    ) -> JoinHandle<ConnectOutcome> {
        let epoch = {
            let mut registry = self.lock();
            // A handshake already running for the same channel is kept. A cycle
            // parked on a retry timer is restarted, since the sweep cancels the timer.
            let coalesce = origin == Origin::Caller
                && registry.is_attempting(id, &channel)
                && !registry.has_retry_timer(id);

            let swept = if coalesce {
                registry.sweep_keeping_attempt(id)
            } else {
                registry.sweep()
            };
            if swept > 0 {
                ChannelMetrics::record_swept(swept as u64);
                tracing::debug!(swept, "Closed existing connections before connecting");
            }

            if coalesce {
                tracing::debug!(
                    connection_id = id,
                    channel = %channel.name,
                    "Connection attempt already in flight"
                );
                return tokio::spawn(async { ConnectOutcome::AlreadyAttempting });
            }

            registry.begin_attempt(id, channel.clone());
            registry.epoch()
        };

        let shared = self.clone();
        tokio::spawn(async move { shared.run_initial(id, channel, epoch).await })
    }

    async fn run_initial(
        self: Arc<Self>,
        id: ConnectionId,
        channel: ChannelDescriptor,
        epoch: u64,
    ) -> ConnectOutcome {
        tracing::info!(connection_id = id, channel = %channel.name, "Connecting");
        let result = self.attempt(id, &channel, epoch).await;
        self.settle(id, channel, epoch, 0, result)
    }

    /// One connection attempt: network check, token, handshake, subscribe.
    pub(crate) async fn attempt(
        self: &Arc<Self>,
        id: ConnectionId,
        channel: &ChannelDescriptor,
        epoch: u64,
    ) -> AttemptResult {
        ChannelMetrics::record_attempt();

        if let Some(network) = &self.network {
            let state = network.fetch().await;
            if !state.is_usable() {
                self.update_status(id, epoch, ConnectionStatus::Disconnected);
                return Err(ChannelError::Unreachable);
            }
        }

        let Some(token) = self.token_provider.token().await else {
            self.update_status(id, epoch, ConnectionStatus::Error);
            return Err(ChannelError::Unauthenticated);
        };

        let subscribe = match subscribe_frame(channel) {
            Ok(frame) => frame,
            Err(e) => {
                self.update_status(id, epoch, ConnectionStatus::Error);
                return Err(e.into());
            }
        };

        // The URL embeds the token; never log it
        let url = build_connection_url(self.platform.as_ref(), &self.config.url, &token);
        let handshake = tokio::time::timeout(self.config.connect_timeout, self.connector.connect(&url));

        let socket = match handshake.await {
            Ok(Ok(socket)) => socket,
            Ok(Err(e)) => {
                self.update_status(id, epoch, ConnectionStatus::Error);
                return Err(e);
            }
            Err(_) => {
                // Dropping the handshake future closes the half-open socket
                self.update_status(id, epoch, ConnectionStatus::Disconnected);
                return Err(ChannelError::Timeout(
                    self.config.connect_timeout.as_millis() as u64,
                ));
            }
        };

        self.open(id, channel, epoch, socket, subscribe).await
    }

    async fn open(
        self: &Arc<Self>,
        id: ConnectionId,
        channel: &ChannelDescriptor,
        epoch: u64,
        socket: Socket,
        subscribe: String,
    ) -> AttemptResult {
        let Socket { mut sink, stream } = socket;

        let current = self.lock().is_current(id, epoch);
        if !current {
            discard(sink).await;
            return Ok(Opened::Superseded);
        }

        if let Err(e) = sink.send(Message::Text(subscribe)).await {
            self.update_status(id, epoch, ConnectionStatus::Error);
            return Err(e);
        }

        let socket_id = Uuid::new_v4();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (teardown_tx, teardown_rx) = oneshot::channel();

        let registered = {
            let mut registry = self.lock();
            if registry.is_current(id, epoch) {
                let record = ConnectionRecord::new(socket_id, channel.clone(), outbound_tx, teardown_tx);
                registry.insert_connection(id, record);
                registry.set_connected(id);
                true
            } else {
                false
            }
        };
        if !registered {
            discard(sink).await;
            return Ok(Opened::Superseded);
        }

        tracing::info!(
            connection_id = id,
            socket_id = %socket_id,
            channel = %channel.name,
            "Connection established"
        );

        tokio::spawn(write_loop(id, socket_id, sink, outbound_rx));
        tokio::spawn(self.clone().read_loop(id, socket_id, stream, teardown_rx));

        Ok(Opened::Registered)
    }

    async fn read_loop(
        self: Arc<Self>,
        id: ConnectionId,
        socket_id: Uuid,
        mut stream: FrameStream,
        mut teardown: oneshot::Receiver<()>,
    ) {
        // The close that follows an error drives the reconnect; a second
        // error in a row means the stream will not close on its own.
        let mut errored = false;
        loop {
            tokio::select! {
                biased;

                _ = &mut teardown => break,

                frame = stream.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        errored = false;
                        self.dispatch(id, socket_id, InboundFrame::Text(text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        errored = false;
                        self.dispatch(id, socket_id, InboundFrame::Binary(data));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(
                            connection_id = id,
                            socket_id = %socket_id,
                            code = ?frame.as_ref().map(|f| f.code),
                            "Close frame received"
                        );
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(
                            connection_id = id,
                            socket_id = %socket_id,
                            error = %e,
                            "Transport error"
                        );
                        if errored {
                            break;
                        }
                        errored = true;
                        self.mark_errored(id, socket_id);
                    }
                    None => break,
                },
            }
        }

        self.on_closed(id, socket_id);
    }

    fn mark_errored(&self, id: ConnectionId, socket_id: Uuid) {
        let mut registry = self.lock();
        if registry.owns(id, socket_id) {
            registry.set_status(id, ConnectionStatus::Error);
        }
    }

    /// Hand an inbound frame to the listeners of `id`, outside the lock
    fn dispatch(&self, id: ConnectionId, socket_id: Uuid, frame: InboundFrame) {
        let listeners = {
            let registry = self.lock();
            if !registry.owns(id, socket_id) {
                return;
            }
            ChannelMetrics::record_frame_received();
            match registry.listeners(id) {
                Some(set) => set.snapshot(),
                None => return,
            }
        };
        deliver(&listeners, id, &frame);
    }

    fn on_closed(self: &Arc<Self>, id: ConnectionId, socket_id: Uuid) {
        let reconnect = {
            let mut registry = self.lock();
            if registry.take_intentional_teardown(socket_id) {
                tracing::debug!(connection_id = id, socket_id = %socket_id, "Connection closed");
                false
            } else if !registry.owns(id, socket_id) {
                false
            } else {
                registry.remove_closed(id);
                registry.set_status(id, ConnectionStatus::Disconnected);
                true
            }
        };

        if reconnect {
            ChannelMetrics::record_reconnect();
            tracing::info!(connection_id = id, socket_id = %socket_id, "Connection dropped, reconnecting");
            // Detached; the reconnect resolves on its own
            drop(self.start(id, self.config.reconnect_descriptor(id), Origin::Reconnect));
        }
    }

    /// Publish `status` unless the attempt was superseded
    fn update_status(&self, id: ConnectionId, epoch: u64, status: ConnectionStatus) {
        let mut registry = self.lock();
        if registry.is_current(id, epoch) {
            registry.set_status(id, status);
        }
    }
}

async fn write_loop(
    id: ConnectionId,
    socket_id: Uuid,
    mut sink: FrameSink,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(command) = outbound.recv().await {
        match command {
            Outbound::Frame(message) => {
                if let Err(e) = sink.send(message).await {
                    tracing::warn!(
                        connection_id = id,
                        socket_id = %socket_id,
                        error = %e,
                        "Failed to write frame"
                    );
                    break;
                }
                ChannelMetrics::record_frame_sent();
            }
            Outbound::Close => {
                let _ = sink.send(Message::Close(Some(normal_closure()))).await;
                break;
            }
        }
    }
    let _ = sink.close().await;
}

/// Close a socket that lost the race against a newer connect
async fn discard(mut sink: FrameSink) {
    let _ = sink.send(Message::Close(Some(normal_closure()))).await;
    let _ = sink.close().await;
}

fn normal_closure() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: "Normal closure".into(),
    }
}
