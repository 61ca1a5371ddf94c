//! Subscription types for state containers and store watchers.

use crate::types::Refresh;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a subscription.
///
/// Clones of a [`Subscription`] share its id; a container holds at most one
/// registration per id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

type Notify<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

/// An observer attached to a state container, scoped by a selector.
///
/// The container calls it with the old and new whole values whenever the
/// value is replaced; the selector decides whether the observer fires.
pub struct Subscription<T> {
    id: SubscriptionId,
    notify: Notify<T>,
    refresh: Option<Refresh>,
}

impl<T: 'static> Subscription<T> {
    /// Observe the whole value. Fires on every replacement.
    pub fn observe(observer: impl Fn(&T) + Send + Sync + 'static) -> Self {
        Self::from_notify(Arc::new(move |_old: &T, new: &T| observer(new)))
    }

    /// Observe the part of the value `selector` projects.
    ///
    /// The observer runs only when the selection of the new value differs
    /// from the selection of the old one, and receives the new selection.
    pub fn select<S>(
        selector: impl Fn(&T) -> S + Send + Sync + 'static,
        observer: impl Fn(&S) + Send + Sync + 'static,
    ) -> Self
    where
        S: PartialEq + 'static,
    {
        Self::from_notify(Arc::new(move |old: &T, new: &T| {
            let selected = selector(new);
            if selected != selector(old) {
                observer(&selected);
            }
        }))
    }

    /// A subscription that only carries a refresh callback.
    pub fn refresh_only(refresh: impl Fn() + Send + Sync + 'static) -> Self {
        Self::from_notify(Arc::new(|_: &T, _: &T| {})).with_refresh(refresh)
    }

    fn from_notify(notify: Notify<T>) -> Self {
        Self {
            id: SubscriptionId::next(),
            notify,
            refresh: None,
        }
    }
}

impl<T> Subscription<T> {
    /// Attach the host refresh callback, run by `State::refresh`.
    pub fn with_refresh(mut self, refresh: impl Fn() + Send + Sync + 'static) -> Self {
        self.refresh = Some(Arc::new(refresh));
        self
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn notify(&self, old: &T, new: &T) {
        (self.notify)(old, new)
    }

    pub(crate) fn refresh(&self) {
        if let Some(refresh) = &self.refresh {
            refresh();
        }
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            notify: Arc::clone(&self.notify),
            refresh: self.refresh.clone(),
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Handle that detaches a subscription.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is harmless. Dropping
/// the handle does not unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    action: Option<Arc<dyn Fn() + Send + Sync>>,
    done: Arc<AtomicBool>,
}

impl Unsubscribe {
    pub(crate) fn new(action: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            action: Some(Arc::new(action)),
            done: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle with nothing to detach.
    pub fn noop() -> Self {
        Self {
            action: None,
            done: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn unsubscribe(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(action) = &self.action {
            action();
        }
    }

    pub fn is_unsubscribed(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("done", &self.is_unsubscribed())
            .finish()
    }
}

/// Configuration for a store watcher.
#[derive(Clone, Debug)]
pub struct WatchConfig {
    /// Max buffered events before the watcher is dropped.
    /// Default: 1000
    pub buffer_size: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { buffer_size: 1000 }
    }
}

/// Events delivered to store watchers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent<V> {
    /// A key was created or its value changed.
    Updated { key: String, value: V },

    /// A key was removed and not re-created.
    Removed { key: String },

    /// The whole store was cleared.
    Cleared,

    /// The watcher was dropped.
    Dropped { reason: DropReason },
}

/// Why a watcher was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Receiver went away.
    Disconnected,
    /// Explicitly unwatched.
    Unwatched,
}

/// Unique identifier for a store watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Receiving end of a store watcher.
pub struct WatchHandle<V> {
    pub id: WatchId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StoreEvent<V>>,
}

impl<V> WatchHandle<V> {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StoreEvent<V>, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StoreEvent<V>, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StoreEvent<V>, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain every event currently buffered.
    pub fn drain(&self) -> Vec<StoreEvent<V>> {
        self.receiver.try_iter().collect()
    }
}
