//! Shared connection state and the single-active-connection sweep.
//!
//! Every map the manager mutates lives here behind one mutex, so each
//! transition (including a full sweep) is a single critical section.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

use super::listeners::{Listener, ListenerSet};
use super::retry::RetryTimer;
use super::types::StatusSnapshot;
use crate::channel::{ChannelDescriptor, ConnectionId, ConnectionStatus};
use crate::metrics::ChannelMetrics;
use crate::transport::Message;

/// Commands for a connection's writer task
#[derive(Debug)]
pub(crate) enum Outbound {
    Frame(Message),
    /// Send a normal-closure frame and stop
    Close,
}

/// Live socket owned by the manager
pub(crate) struct ConnectionRecord {
    pub socket_id: Uuid,
    pub channel: ChannelDescriptor,
    pub connected_at: DateTime<Utc>,
    outbound: mpsc::UnboundedSender<Outbound>,
    teardown: Option<oneshot::Sender<()>>,
}

impl ConnectionRecord {
    pub fn new(
        socket_id: Uuid,
        channel: ChannelDescriptor,
        outbound: mpsc::UnboundedSender<Outbound>,
        teardown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            socket_id,
            channel,
            connected_at: Utc::now(),
            outbound,
            teardown: Some(teardown),
        }
    }

    /// Open while the writer task is still draining the queue
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }

    pub fn send(&self, message: Message) -> bool {
        self.outbound.send(Outbound::Frame(message)).is_ok()
    }

    /// Close with a normal-closure frame and stop the reader.
    /// Both signals tolerate a socket that is already gone.
    fn shutdown(mut self) {
        let _ = self.outbound.send(Outbound::Close);
        if let Some(teardown) = self.teardown.take() {
            let _ = teardown.send(());
        }
    }
}

pub(crate) struct Registry {
    /// Bumped by every sweep; attempts from an older epoch are discarded
    epoch: u64,
    connections: HashMap<ConnectionId, ConnectionRecord>,
    listeners: HashMap<ConnectionId, ListenerSet>,
    retry_timers: HashMap<ConnectionId, RetryTimer>,
    /// Ids with an attempt cycle in flight (initial attempt or pending retries)
    attempting: HashMap<ConnectionId, ChannelDescriptor>,
    /// Sockets closed on purpose; their close must not self-heal
    intentional_teardown: HashSet<Uuid>,
    status: HashMap<ConnectionId, ConnectionStatus>,
    retry_count: HashMap<ConnectionId, u32>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl Registry {
    pub fn new(status_tx: watch::Sender<StatusSnapshot>) -> Self {
        Self {
            epoch: 0,
            connections: HashMap::new(),
            listeners: HashMap::new(),
            retry_timers: HashMap::new(),
            attempting: HashMap::new(),
            intentional_teardown: HashSet::new(),
            status: HashMap::new(),
            retry_count: HashMap::new(),
            status_tx,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    // ------------------------------------------------------------------
    // Attempt bookkeeping
    // ------------------------------------------------------------------

    pub fn is_attempting(&self, id: ConnectionId, channel: &ChannelDescriptor) -> bool {
        self.attempting.get(&id) == Some(channel)
    }

    pub fn begin_attempt(&mut self, id: ConnectionId, channel: ChannelDescriptor) {
        self.attempting.insert(id, channel);
    }

    /// An attempt from `epoch` may still change state for `id`
    pub fn is_current(&self, id: ConnectionId, epoch: u64) -> bool {
        self.epoch == epoch && self.attempting.contains_key(&id)
    }

    pub fn finish_attempt(&mut self, id: ConnectionId, epoch: u64) {
        if self.epoch == epoch {
            self.attempting.remove(&id);
        }
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub fn insert_connection(&mut self, id: ConnectionId, record: ConnectionRecord) {
        self.attempting.remove(&id);
        if let Some(previous) = self.connections.insert(id, record) {
            // Unreachable while every connect sweeps first; keep the socket from leaking
            self.intentional_teardown.insert(previous.socket_id);
            previous.shutdown();
            ChannelMetrics::record_closed();
        }
        ChannelMetrics::record_opened();
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&ConnectionRecord> {
        self.connections.get(&id)
    }

    /// Whether `socket_id` is still the live socket for `id`
    pub fn owns(&self, id: ConnectionId, socket_id: Uuid) -> bool {
        self.connections
            .get(&id)
            .is_some_and(|record| record.socket_id == socket_id)
    }

    /// Drop the record after the transport closed on its own
    pub fn remove_closed(&mut self, id: ConnectionId) -> Option<ConnectionRecord> {
        let record = self.connections.remove(&id)?;
        ChannelMetrics::record_closed();
        Some(record)
    }

    /// Consume the intentional-teardown flag for a closed socket
    pub fn take_intentional_teardown(&mut self, socket_id: Uuid) -> bool {
        self.intentional_teardown.remove(&socket_id)
    }

    /// Close `id` on purpose: cancel its retry timer, stop any attempt cycle and,
    /// when a socket is live, close it and drop its listeners.
    /// Returns whether a live socket was closed.
    pub fn teardown(&mut self, id: ConnectionId) -> bool {
        if let Some(timer) = self.retry_timers.remove(&id) {
            timer.cancel();
        }
        self.attempting.remove(&id);

        let Some(record) = self.connections.remove(&id) else {
            return false;
        };
        self.intentional_teardown.insert(record.socket_id);
        tracing::debug!(
            connection_id = id,
            socket_id = %record.socket_id,
            channel = %record.channel.name,
            connected_for_ms = (Utc::now() - record.connected_at).num_milliseconds(),
            "Tearing down connection"
        );
        record.shutdown();
        self.listeners.remove(&id);
        ChannelMetrics::record_closed();
        true
    }

    pub fn is_tracked(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
            || self.retry_timers.contains_key(&id)
            || self.attempting.contains_key(&id)
    }

    /// Every id with a socket, a retry timer or an attempt in flight
    pub fn tracked_ids(&self) -> Vec<ConnectionId> {
        let mut ids: HashSet<ConnectionId> = self.connections.keys().copied().collect();
        ids.extend(self.retry_timers.keys().copied());
        ids.extend(self.attempting.keys().copied());
        ids.into_iter().collect()
    }

    /// Tear down every connection, timer, attempt and listener so a new
    /// connection can become the only live one. Every known id ends up
    /// `disconnected` with a retry count of 0. Returns the number of sockets closed.
    pub fn sweep(&mut self) -> usize {
        self.epoch += 1;
        self.clear_all()
    }

    /// Same as [`Registry::sweep`] but the handshake in flight for `id` stays
    /// current and may still open. Only the newest epoch can hold such an
    /// attempt, so the epoch is left as is.
    pub fn sweep_keeping_attempt(&mut self, id: ConnectionId) -> usize {
        let kept = self.attempting.remove(&id);
        let closed = self.clear_all();
        if let Some(channel) = kept {
            self.attempting.insert(id, channel);
        }
        closed
    }

    fn clear_all(&mut self) -> usize {
        let mut closed = 0;
        for id in self.tracked_ids() {
            if self.teardown(id) {
                closed += 1;
            }
        }

        self.listeners.clear();
        self.attempting.clear();

        for status in self.status.values_mut() {
            *status = ConnectionStatus::Disconnected;
        }
        for count in self.retry_count.values_mut() {
            *count = 0;
        }
        self.publish();

        closed
    }

    // ------------------------------------------------------------------
    // Retry timers
    // ------------------------------------------------------------------

    /// Register the pending retry for `id`, cancelling any earlier one
    pub fn replace_retry_timer(&mut self, id: ConnectionId, timer: RetryTimer) {
        if let Some(previous) = self.retry_timers.insert(id, timer) {
            previous.cancel();
        }
    }

    /// Claim the timer that just fired; false when it was superseded or cancelled
    pub fn take_retry_timer(&mut self, id: ConnectionId, epoch: u64, attempt: u32) -> bool {
        match self.retry_timers.get(&id) {
            Some(timer) if timer.matches(epoch, attempt) => {
                self.retry_timers.remove(&id);
                true
            }
            _ => false,
        }
    }

    pub fn has_retry_timer(&self, id: ConnectionId) -> bool {
        self.retry_timers.contains_key(&id)
    }

    // ------------------------------------------------------------------
    // Listeners
    // ------------------------------------------------------------------

    pub fn add_listener(&mut self, id: ConnectionId, listener: Listener) {
        self.listeners.entry(id).or_default().push(listener);
    }

    pub fn remove_listener(&mut self, id: ConnectionId, listener: &Listener) -> bool {
        let Some(set) = self.listeners.get_mut(&id) else {
            return false;
        };
        let removed = set.remove(listener);
        if set.is_empty() {
            self.listeners.remove(&id);
        }
        removed
    }

    pub fn listeners(&self, id: ConnectionId) -> Option<&ListenerSet> {
        self.listeners.get(&id)
    }

    // ------------------------------------------------------------------
    // Observable status
    // ------------------------------------------------------------------

    pub fn set_status(&mut self, id: ConnectionId, status: ConnectionStatus) {
        self.status.insert(id, status);
        self.publish();
    }

    pub fn set_retry_count(&mut self, id: ConnectionId, count: u32) {
        self.retry_count.insert(id, count);
        self.publish();
    }

    /// Mark `id` connected and reset its retry count in one transition
    pub fn set_connected(&mut self, id: ConnectionId) {
        self.status.insert(id, ConnectionStatus::Connected);
        self.retry_count.insert(id, 0);
        self.publish();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status.clone(),
            retry_count: self.retry_count.clone(),
        }
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}
