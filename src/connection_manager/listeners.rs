//! Per-connection fan-out of inbound frames

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::channel::{ConnectionId, InboundFrame};
use crate::metrics::ChannelMetrics;

/// Callback receiving every inbound frame of one connection id.
///
/// Removal compares pointers, so keep the `Arc` returned by [`listener`] to
/// unregister later.
pub type Listener = Arc<dyn Fn(&InboundFrame) + Send + Sync>;

/// Wrap a closure as a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&InboundFrame) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Listeners in registration order; most ids carry one or two
#[derive(Clone, Default)]
pub(crate) struct ListenerSet {
    entries: SmallVec<[Listener; 2]>,
}

impl ListenerSet {
    pub fn push(&mut self, listener: Listener) {
        self.entries.push(listener);
    }

    /// Remove every registration of `listener`; returns whether any was found
    pub fn remove(&mut self, listener: &Listener) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| !same_listener(entry, listener));
        self.entries.len() != before
    }

    pub fn contains(&self, listener: &Listener) -> bool {
        self.entries.iter().any(|entry| same_listener(entry, listener))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current listeners, so delivery can run outside the registry lock
    pub fn snapshot(&self) -> SmallVec<[Listener; 2]> {
        self.entries.clone()
    }
}

/// Deliver `frame` to each listener in order. A panicking listener is logged and
/// skipped; the rest still run. Returns how many listeners panicked.
pub(crate) fn deliver(listeners: &[Listener], id: ConnectionId, frame: &InboundFrame) -> usize {
    let mut panicked = 0;
    for (index, listener) in listeners.iter().enumerate() {
        if panic::catch_unwind(AssertUnwindSafe(|| listener(frame))).is_err() {
            panicked += 1;
            ChannelMetrics::record_listener_panic();
            tracing::error!(
                connection_id = id,
                listener_index = index,
                "Message listener panicked, continuing delivery"
            );
        }
    }
    panicked
}
