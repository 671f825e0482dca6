//! Public facade over the connection registry

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::WatchStream;

use super::listeners::Listener;
use super::registry::Registry;
use super::types::{ConnectOutcome, ManagerConfig, Origin, StatusSnapshot};
use crate::adapters::{AuthTokenProvider, NativePlatform, NetworkReachability, PlatformAdapter};
use crate::channel::{ChannelDescriptor, ConnectionId, ConnectionStatus};
use crate::metrics::ChannelMetrics;
use crate::transport::{Connector, Message, TungsteniteConnector};

/// State shared by the facade and every background task
pub(crate) struct Shared {
    pub(crate) config: ManagerConfig,
    pub(crate) token_provider: Arc<dyn AuthTokenProvider>,
    pub(crate) platform: Arc<dyn PlatformAdapter>,
    pub(crate) network: Option<Arc<dyn NetworkReachability>>,
    pub(crate) connector: Arc<dyn Connector>,
    registry: Mutex<Registry>,
    status_rx: watch::Receiver<StatusSnapshot>,
}

impl Shared {
    /// Registry lock; a panic while holding it never leaves the maps half-updated
    /// in a way later transitions cannot repair, so poisoning is ignored.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Manages real-time channel connections keyed by [`ConnectionId`].
///
/// At most one connection is live at a time: every [`connect`](Self::connect)
/// first closes everything else. Cloning is cheap and clones share state.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use realtime_channel_client::adapters::StaticTokenProvider;
/// use realtime_channel_client::channel::ChannelDescriptor;
/// use realtime_channel_client::connection_manager::{listener, ChannelManager, ManagerConfig};
///
/// # async fn run() {
/// let manager = ChannelManager::builder(
///     ManagerConfig::new("wss://chat.example.com/cable"),
///     Arc::new(StaticTokenProvider::new("token")),
/// )
/// .build();
///
/// manager.connect(7, ChannelDescriptor::new("ChatChannel").with_param("chat_id", 7));
/// manager.on_message(7, listener(|frame| println!("{:?}", frame)));
///
/// if manager.wait_for_connection_default(7).await {
///     manager.send_message(7, &serde_json::json!({ "body": "hi" }));
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct ChannelManager {
    shared: Arc<Shared>,
}

impl ChannelManager {
    pub fn builder(
        config: ManagerConfig,
        token_provider: Arc<dyn AuthTokenProvider>,
    ) -> ChannelManagerBuilder {
        ChannelManagerBuilder {
            config,
            token_provider,
            platform: None,
            network: None,
            connector: None,
        }
    }

    /// Close every other connection, then open `id` on `channel`.
    ///
    /// The sweep happens before this returns; the attempt itself runs in the
    /// background. Awaiting the handle is optional: retries and reconnects
    /// proceed either way. Must be called within a Tokio runtime.
    pub fn connect(&self, id: ConnectionId, channel: ChannelDescriptor) -> JoinHandle<ConnectOutcome> {
        self.shared.start(id, channel, Origin::Caller)
    }

    /// Close `id` with a normal closure. No-op when nothing is tracked for it.
    pub fn close(&self, id: ConnectionId) {
        let mut registry = self.shared.lock();
        if !registry.is_tracked(id) {
            return;
        }
        registry.teardown(id);
        registry.set_status(id, ConnectionStatus::Disconnected);
        tracing::info!(connection_id = id, "Connection closed by caller");
    }

    pub fn close_all(&self) {
        let mut registry = self.shared.lock();
        let ids = registry.tracked_ids();
        for id in &ids {
            registry.teardown(*id);
            registry.set_status(*id, ConnectionStatus::Disconnected);
        }
        if !ids.is_empty() {
            tracing::info!(closed = ids.len(), "All connections closed");
        }
    }

    /// Whether `id` has a socket that is still open
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.shared
            .lock()
            .connection(id)
            .is_some_and(|record| record.is_open())
    }

    /// Serialize `payload` as JSON and send it as one text frame.
    ///
    /// Returns `false` (and drops the message) when `id` has no open socket.
    pub fn send_message<T: Serialize + ?Sized>(&self, id: ConnectionId, payload: &T) -> bool {
        let text = match serde_json::to_string(payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(connection_id = id, error = %e, "Failed to serialize message");
                ChannelMetrics::record_send_dropped();
                return false;
            }
        };

        let sent = {
            let registry = self.shared.lock();
            registry
                .connection(id)
                .is_some_and(|record| record.is_open() && record.send(Message::Text(text)))
        };
        if !sent {
            tracing::debug!(connection_id = id, "Connection not open, message dropped");
            ChannelMetrics::record_send_dropped();
        }
        sent
    }

    /// Register `listener` for frames arriving on `id`.
    ///
    /// Registration may precede the connection, but a later `connect` sweep
    /// clears it; register after calling `connect`.
    pub fn on_message(&self, id: ConnectionId, listener: Listener) {
        self.shared.lock().add_listener(id, listener);
    }

    /// Register `listener` on `id` and restore it whenever `id` comes back
    /// `connected` without it, as after a self-healing reconnect sweeps.
    ///
    /// Frames arriving between the reconnect and the restore are not seen.
    /// The watcher stops when the manager is dropped; abort the handle to stop earlier.
    pub fn on_message_retained(&self, id: ConnectionId, listener: Listener) -> JoinHandle<()> {
        self.on_message(id, listener.clone());

        let shared = Arc::downgrade(&self.shared);
        let mut status_rx = self.subscribe_status();
        tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let connected =
                    status_rx.borrow_and_update().status_of(id) == Some(ConnectionStatus::Connected);
                if !connected {
                    continue;
                }
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                let mut registry = shared.lock();
                let present = registry
                    .listeners(id)
                    .is_some_and(|set| set.contains(&listener));
                if !present {
                    registry.add_listener(id, listener.clone());
                    tracing::debug!(connection_id = id, "Message listener restored after reconnect");
                }
            }
        })
    }

    /// Remove a listener previously passed to [`on_message`](Self::on_message)
    pub fn remove_message_listener(&self, id: ConnectionId, listener: &Listener) {
        self.shared.lock().remove_listener(id, listener);
    }

    /// Poll until `id` is connected or `timeout` elapses
    pub async fn wait_for_connection(&self, id: ConnectionId, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_connected(id) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep(self.shared.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// [`wait_for_connection`](Self::wait_for_connection) with the configured timeout
    pub async fn wait_for_connection_default(&self, id: ConnectionId) -> bool {
        self.wait_for_connection(id, self.shared.config.wait_timeout)
            .await
    }

    /// Current status per id
    pub fn connection_status(&self) -> std::collections::HashMap<ConnectionId, ConnectionStatus> {
        self.shared.status_rx.borrow().status.clone()
    }

    /// Current retry count per id
    pub fn retry_count(&self) -> std::collections::HashMap<ConnectionId, u32> {
        self.shared.status_rx.borrow().retry_count.clone()
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.shared.status_rx.borrow().clone()
    }

    /// Receiver notified on every status or retry-count change
    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.shared.status_rx.clone()
    }

    pub fn status_stream(&self) -> WatchStream<StatusSnapshot> {
        WatchStream::new(self.subscribe_status())
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    #[cfg(test)]
    pub(crate) fn has_pending_retry(&self, id: ConnectionId) -> bool {
        self.shared.lock().has_retry_timer(id)
    }

    #[cfg(test)]
    pub(crate) fn listener_count(&self, id: ConnectionId) -> usize {
        self.shared.lock().listeners(id).map_or(0, |set| set.len())
    }
}

pub struct ChannelManagerBuilder {
    config: ManagerConfig,
    token_provider: Arc<dyn AuthTokenProvider>,
    platform: Option<Arc<dyn PlatformAdapter>>,
    network: Option<Arc<dyn NetworkReachability>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ChannelManagerBuilder {
    /// Defaults to [`NativePlatform::current`]
    pub fn platform(mut self, platform: Arc<dyn PlatformAdapter>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Reachability check before each attempt; skipped when unset
    pub fn network(mut self, network: Arc<dyn NetworkReachability>) -> Self {
        self.network = Some(network);
        self
    }

    /// Defaults to [`TungsteniteConnector`]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn build(self) -> ChannelManager {
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let shared = Shared {
            config: self.config,
            token_provider: self.token_provider,
            platform: self
                .platform
                .unwrap_or_else(|| Arc::new(NativePlatform::current())),
            network: self.network,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(TungsteniteConnector)),
            registry: Mutex::new(Registry::new(status_tx)),
            status_rx,
        };
        ChannelManager {
            shared: Arc::new(shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FnTokenProvider, NetworkState, StaticTokenProvider};
    use crate::channel::{subscribe_frame, InboundFrame};
    use crate::connection_manager::listener;
    use crate::transport::memory::{ConnectBehavior, MemoryConnector};
    use crate::transport::{CloseCode, CloseFrame};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    const URL: &str = "ws://chat.test/cable";

    fn chat(id: ConnectionId) -> ChannelDescriptor {
        ChannelDescriptor::new("ChatChannel").with_param("chat_id", id)
    }

    fn manager(connector: &Arc<MemoryConnector>) -> ChannelManager {
        ChannelManager::builder(ManagerConfig::new(URL), Arc::new(StaticTokenProvider::new("secret")))
            .platform(Arc::new(NativePlatform::new("linux")))
            .connector(connector.clone())
            .build()
    }

    fn status(manager: &ChannelManager, id: ConnectionId) -> Option<ConnectionStatus> {
        manager.status_snapshot().status_of(id)
    }

    struct Offline;

    #[async_trait]
    impl NetworkReachability for Offline {
        async fn fetch(&self) -> NetworkState {
            NetworkState::offline()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_subscribes() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);

        let outcome = manager.connect(1, chat(1)).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Connected);

        let mut peer = connector.next_peer().await.unwrap();
        assert_eq!(peer.url(), "ws://chat.test/cable?token=secret");
        assert_eq!(
            peer.recv().await,
            Some(Message::Text(subscribe_frame(&chat(1)).unwrap()))
        );

        assert!(manager.is_connected(1));
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Connected));
        assert_eq!(manager.retry_count().get(&1), Some(&0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_at_most_one_connection_is_live() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);

        for id in [1, 2, 3, 2] {
            assert_eq!(manager.connect(id, chat(id)).await.unwrap(), ConnectOutcome::Connected);
            assert_eq!(manager.status_snapshot().connected_ids(), vec![id]);
        }

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(manager.is_connected(2));
        assert!(!manager.is_connected(1));
        assert!(!manager.is_connected(3));
        // Sweeps never trigger the self-healing reconnect
        assert_eq!(connector.attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.connect(1, chat(1)).await.unwrap();
        let mut peer = connector.next_peer().await.unwrap();
        peer.recv().await;

        manager.close(1);
        let once = manager.status_snapshot();
        manager.close(1);
        assert_eq!(manager.status_snapshot(), once);

        assert!(!manager.is_connected(1));
        assert_eq!(once.status_of(1), Some(ConnectionStatus::Disconnected));
        assert_eq!(
            peer.recv().await,
            Some(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "Normal closure".into(),
            })))
        );
        assert_eq!(peer.recv().await, None);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unknown_id_is_noop() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.close(42);
        manager.close_all();
        assert!(manager.connection_status().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_transport_gives_up_after_three_retries() {
        let connector = Arc::new(MemoryConnector::refusing());
        let manager = manager(&connector);

        let outcome = manager.connect(1, chat(1)).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Error));
        assert!(manager.has_pending_retry(1));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 4);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Error));
        assert_eq!(manager.retry_count().get(&1), Some(&3));
        assert!(!manager.has_pending_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_and_resets_count() {
        let connector = Arc::new(
            MemoryConnector::accepting()
                .with_script([ConnectBehavior::Refuse, ConnectBehavior::Refuse]),
        );
        let manager = manager(&connector);

        manager.connect(1, chat(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.retry_count().get(&1), Some(&1));

        assert!(manager.wait_for_connection(1, Duration::from_secs(2)).await);
        assert_eq!(connector.attempts(), 3);
        assert_eq!(manager.retry_count().get(&1), Some(&0));
        assert!(!manager.has_pending_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_triggers_exactly_one_reconnect() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);

        let room = ChannelDescriptor::new("RoomChannel").with_param("room", "lobby");
        manager.connect(5, room).await.unwrap();
        let mut first = connector.next_peer().await.unwrap();
        first.recv().await;

        first.disconnect();

        let mut second = connector.next_peer().await.unwrap();
        assert_eq!(
            second.recv().await,
            Some(Message::Text(subscribe_frame(&chat(5)).unwrap()))
        );
        assert!(manager.wait_for_connection(5, Duration::from_secs(1)).await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.retry_count().get(&5), Some(&0));
        assert!(manager.is_connected(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_does_not_block_others() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.connect(1, chat(1)).await.unwrap();
        let peer = connector.next_peer().await.unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_message(1, listener(|_| panic!("listener failure")));
        manager.on_message(
            1,
            listener(move |frame| {
                let _ = tx.send(frame.clone());
            }),
        );

        peer.send_text(r#"{"message":"hello"}"#);
        peer.send_binary(vec![1, 2, 3]);

        assert_eq!(
            rx.recv().await,
            Some(InboundFrame::Text(r#"{"message":"hello"}"#.into()))
        );
        assert_eq!(rx.recv().await, Some(InboundFrame::Binary(vec![1, 2, 3])));
        assert!(manager.is_connected(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_listener_stops_receiving() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.connect(1, chat(1)).await.unwrap();
        let peer = connector.next_peer().await.unwrap();

        let removed = Arc::new(AtomicUsize::new(0));
        let counter = removed.clone();
        let doomed = listener(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        manager.on_message(1, doomed.clone());
        manager.on_message(
            1,
            listener(move |frame| {
                let _ = tx.send(frame.clone());
            }),
        );

        manager.remove_message_listener(1, &doomed);
        // Unknown listener or id is a no-op
        manager.remove_message_listener(1, &listener(|_| {}));
        manager.remove_message_listener(9, &doomed);

        peer.send_text("ping");
        assert_eq!(rx.recv().await, Some(InboundFrame::Text("ping".into())));
        assert_eq!(removed.load(Ordering::SeqCst), 0);
        assert_eq!(manager.listener_count(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sweeps_previous_id() {
        let connector = Arc::new(MemoryConnector::accepting().with_script([ConnectBehavior::Refuse]));
        let manager = manager(&connector);

        assert_eq!(manager.connect(1, chat(1)).await.unwrap(), ConnectOutcome::Failed);
        manager.on_message(1, listener(|_| {}));
        assert!(manager.has_pending_retry(1));

        assert_eq!(manager.connect(2, chat(2)).await.unwrap(), ConnectOutcome::Connected);
        assert_eq!(manager.listener_count(1), 0);
        assert!(!manager.has_pending_retry(1));
        assert!(!manager.is_connected(1));
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Disconnected));
        assert_eq!(manager.status_snapshot().retries_of(1), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_token_fails_without_transport() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = ChannelManager::builder(
            ManagerConfig::new(URL),
            Arc::new(StaticTokenProvider::unauthenticated()),
        )
        .connector(connector.clone())
        .build();

        let outcome = manager.connect(7, chat(7)).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Unauthenticated);
        assert_eq!(status(&manager, 7), Some(ConnectionStatus::Error));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 0);
        assert!(!manager.has_pending_retry(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_network_skips_transport() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = ChannelManager::builder(
            ManagerConfig::new(URL),
            Arc::new(StaticTokenProvider::new("secret")),
        )
        .network(Arc::new(Offline))
        .connector(connector.clone())
        .build();

        let outcome = manager.connect(1, chat(1)).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Unreachable);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Disconnected));
        assert_eq!(connector.attempts(), 0);
        assert!(!manager.has_pending_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_times_out() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);

        let started = Instant::now();
        assert!(!manager.wait_for_connection(3, Duration::from_millis(300)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_connection_without_awaiting_connect() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        let _detached = manager.connect(4, chat(4));
        assert!(manager.wait_for_connection_default(4).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_handshake_times_out_and_retries() {
        let connector = Arc::new(MemoryConnector::hanging());
        let manager = manager(&connector);

        let started = Instant::now();
        let outcome = manager.connect(1, chat(1)).await.unwrap();
        assert_eq!(outcome, ConnectOutcome::Failed);
        assert!(started.elapsed() >= Duration::from_millis(5000));
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Disconnected));
        assert!(manager.has_pending_retry(1));

        manager.close(1);
        assert!(!manager.has_pending_retry(1));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_connect_sweeps_and_keeps_handshake() {
        let connector = Arc::new(MemoryConnector::hanging());
        let manager = manager(&connector);

        // First handshake times out at 5s, the retry starts at 6s and hangs too
        let first = manager.connect(1, chat(1));
        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.status_snapshot().retries_of(1), 1);
        manager.on_message(1, listener(|_| {}));

        let second = manager.connect(1, chat(1));
        assert_eq!(manager.listener_count(1), 0);
        assert_eq!(manager.status_snapshot().retries_of(1), 0);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Disconnected));
        assert_eq!(second.await.unwrap(), ConnectOutcome::AlreadyAttempting);
        assert_eq!(first.await.unwrap(), ConnectOutcome::Failed);
        assert_eq!(connector.attempts(), 2);

        // The kept handshake still belongs to the live cycle and schedules its retry
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(manager.has_pending_retry(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_during_retry_wait_restarts_cycle() {
        let connector = Arc::new(MemoryConnector::refusing());
        let manager = manager(&connector);

        assert_eq!(manager.connect(1, chat(1)).await.unwrap(), ConnectOutcome::Failed);
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(manager.status_snapshot().retries_of(1), 1);
        assert!(manager.has_pending_retry(1));
        manager.on_message(1, listener(|_| {}));

        let again = manager.connect(1, chat(1));
        assert_eq!(manager.listener_count(1), 0);
        assert_eq!(manager.status_snapshot().retries_of(1), 0);
        assert_eq!(again.await.unwrap(), ConnectOutcome::Failed);
        assert_eq!(connector.attempts(), 3);

        // The restarted cycle gets the full retry budget
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts(), 6);
        assert_eq!(manager.status_snapshot().retries_of(1), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_waits_for_close_to_reconnect() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.connect(1, chat(1)).await.unwrap();
        let mut first = connector.next_peer().await.unwrap();
        first.recv().await;

        let mut status_rx = manager.subscribe_status();
        assert!(first.send_error());
        assert!(status_rx
            .wait_for(|snapshot| snapshot.status_of(1) == Some(ConnectionStatus::Error))
            .await
            .is_ok());

        // The error alone never reconnects
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Error));

        first.disconnect();
        let mut second = connector.next_peer().await.unwrap();
        assert_eq!(
            second.recv().await,
            Some(Message::Text(subscribe_frame(&chat(1)).unwrap()))
        );
        assert!(manager.wait_for_connection(1, Duration::from_secs(1)).await);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.status_snapshot().retries_of(1), 0);
        assert_eq!(status(&manager, 1), Some(ConnectionStatus::Connected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_listener_survives_reconnect() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        manager.connect(5, chat(5)).await.unwrap();
        let mut first = connector.next_peer().await.unwrap();
        first.recv().await;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let retained = manager.on_message_retained(
            5,
            listener(move |frame| {
                let _ = tx.send(frame.clone());
            }),
        );
        first.send_text("before");
        assert_eq!(rx.recv().await, Some(InboundFrame::Text("before".into())));

        first.disconnect();
        let mut second = connector.next_peer().await.unwrap();
        second.recv().await;
        assert!(manager.wait_for_connection(5, Duration::from_secs(1)).await);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(manager.listener_count(5), 1);
        second.send_text("after");
        assert_eq!(rx.recv().await, Some(InboundFrame::Text("after".into())));
        retained.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_attempt_is_never_registered() {
        let connector = Arc::new(MemoryConnector::accepting());
        let slow_token = FnTokenProvider::new(|| async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            Some("secret".to_string())
        });
        let manager = ChannelManager::builder(ManagerConfig::new(URL), Arc::new(slow_token))
            .connector(connector.clone())
            .build();

        let first = manager.connect(1, chat(1));
        let second = manager.connect(2, chat(2));

        assert_eq!(first.await.unwrap(), ConnectOutcome::Superseded);
        assert_eq!(second.await.unwrap(), ConnectOutcome::Connected);
        assert!(!manager.is_connected(1));
        assert_eq!(manager.status_snapshot().connected_ids(), vec![2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_message_only_when_open() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);

        assert!(!manager.send_message(1, &json!({ "body": "early" })));

        manager.connect(1, chat(1)).await.unwrap();
        let mut peer = connector.next_peer().await.unwrap();
        peer.recv().await;

        assert!(manager.send_message(1, &json!({ "body": "hi" })));
        assert_eq!(peer.recv().await, Some(Message::Text(r#"{"body":"hi"}"#.into())));

        assert!(!manager.send_message(2, &json!({ "body": "elsewhere" })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_is_published() {
        let connector = Arc::new(MemoryConnector::accepting());
        let manager = manager(&connector);
        let mut status_rx = manager.subscribe_status();

        manager.connect(1, chat(1)).await.unwrap();
        status_rx.changed().await.unwrap();
        assert_eq!(
            status_rx.borrow_and_update().status_of(1),
            Some(ConnectionStatus::Connected)
        );
    }
}
