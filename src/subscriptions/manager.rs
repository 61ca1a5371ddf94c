//! Watch manager for broadcasting store events over channels.

use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::types::{DropReason, StoreEvent, WatchConfig, WatchHandle, WatchId};

/// Internal watcher state.
struct Watcher<V> {
    sender: Sender<StoreEvent<V>>,
}

impl<V> Watcher<V> {
    /// Try to send an event. Returns the drop reason if the watcher has to go.
    fn try_send(&self, event: StoreEvent<V>) -> Option<DropReason> {
        match self.sender.try_send(event) {
            Ok(()) => None,
            Err(crossbeam_channel::TrySendError::Full(_)) => Some(DropReason::BufferOverflow),
            Err(crossbeam_channel::TrySendError::Disconnected(_)) => {
                Some(DropReason::Disconnected)
            }
        }
    }
}

/// Manages store watchers and broadcasts events to them.
pub struct WatchManager<V> {
    /// Active watchers by ID.
    watchers: RwLock<HashMap<WatchId, Watcher<V>>>,
    /// Counter for generating watcher IDs.
    next_id: AtomicU64,
}

impl<V: Clone> WatchManager<V> {
    pub fn new() -> Self {
        Self {
            watchers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Create a new watcher.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle<V> {
        let id = WatchId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size);

        self.watchers.write().insert(id, Watcher { sender });

        WatchHandle { id, receiver }
    }

    /// Remove a watcher.
    pub fn unwatch(&self, id: WatchId) {
        let mut watchers = self.watchers.write();
        if let Some(watcher) = watchers.remove(&id) {
            // Best effort
            let _ = watcher.sender.try_send(StoreEvent::Dropped {
                reason: DropReason::Unwatched,
            });
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.read().len()
    }

    pub fn broadcast_updated(&self, key: &str, value: &V) {
        if self.watchers.read().is_empty() {
            return;
        }
        self.broadcast(StoreEvent::Updated {
            key: key.to_string(),
            value: value.clone(),
        });
    }

    pub fn broadcast_removed(&self, key: &str) {
        self.broadcast(StoreEvent::Removed {
            key: key.to_string(),
        });
    }

    pub fn broadcast_cleared(&self) {
        self.broadcast(StoreEvent::Cleared);
    }

    /// Send to every watcher. Drops watchers that fail to receive.
    fn broadcast(&self, event: StoreEvent<V>) {
        let mut to_remove = Vec::new();

        {
            let watchers = self.watchers.read();
            for (id, watcher) in watchers.iter() {
                if let Some(reason) = watcher.try_send(event.clone()) {
                    to_remove.push((*id, reason));
                }
            }
        }

        if !to_remove.is_empty() {
            let mut watchers = self.watchers.write();
            for (id, reason) in to_remove {
                if let Some(watcher) = watchers.remove(&id) {
                    debug!(watch_id = id.0, ?reason, "dropping store watcher");
                    // Might fail, that's ok
                    let _ = watcher.sender.try_send(StoreEvent::Dropped { reason });
                }
            }
        }
    }
}

impl<V: Clone> Default for WatchManager<V> {
    fn default() -> Self {
        Self::new()
    }
}
