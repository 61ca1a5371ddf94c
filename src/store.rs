//! Keyed store of state containers.

use crate::error::{Result, StoreError};
use crate::json::Json;
use crate::persistence::{PersistConfig, Persistence};
use crate::state::State;
use crate::subscriptions::{Subscription, Unsubscribe, WatchConfig, WatchHandle, WatchId, WatchManager};
use crate::types::{Initial, StoreObserver};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

/// Options for [`Store::set_state`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SetStateOptions {
    /// Persist this key. `None` falls back to
    /// [`PersistConfig::persist_entire_store`].
    pub persist: Option<bool>,
}

impl SetStateOptions {
    pub fn persist(persist: bool) -> Self {
        Self {
            persist: Some(persist),
        }
    }
}

/// Options for [`Store::get_state`].
pub struct GetStateOptions<V> {
    /// Create the key with this value if it doesn't exist.
    pub default: Option<Initial<V>>,
    /// Persistence for a key created from `default`.
    pub persist: Option<bool>,
}

impl<V> GetStateOptions<V> {
    pub fn with_default(value: V) -> Self {
        Self {
            default: Some(Initial::Value(value)),
            persist: None,
        }
    }

    pub fn with_initializer(f: impl FnOnce() -> V + 'static) -> Self {
        Self {
            default: Some(Initial::lazy(f)),
            persist: None,
        }
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.persist = Some(persist);
        self
    }
}

impl<V> Default for GetStateOptions<V> {
    fn default() -> Self {
        Self {
            default: None,
            persist: None,
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for GetStateOptions<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetStateOptions")
            .field("default", &self.default)
            .field("persist", &self.persist)
            .finish()
    }
}

/// One key as listed by [`Store::items`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoreItem<V> {
    pub key: String,
    pub value: V,
    pub persist: bool,
}

/// A container managed by the store.
struct Entry<V> {
    state: State<V>,
    /// Detaches the bridge subscription installed by the store.
    unsubscribe: Unsubscribe,
    persist: bool,
}

struct StoreSubscriber<V> {
    observer: StoreObserver<V>,
    active: Arc<AtomicBool>,
}

impl<V> Clone for StoreSubscriber<V> {
    fn clone(&self) -> Self {
        Self {
            observer: Arc::clone(&self.observer),
            active: Arc::clone(&self.active),
        }
    }
}

struct StoreInner<V> {
    /// Entries in creation order.
    entries: RwLock<IndexMap<String, Entry<V>>>,
    subscribers: Mutex<Vec<StoreSubscriber<V>>>,
    watchers: WatchManager<V>,
    persistence: RwLock<Option<PersistConfig<V>>>,
}

impl<V: Clone> StoreInner<V> {
    /// Fan a key change out to store observers and watchers.
    fn on_update(&self, key: &str, value: &V) {
        let subscribers = self.subscribers.lock().clone();
        for subscriber in &subscribers {
            if subscriber.active.load(Ordering::SeqCst) {
                (subscriber.observer)(key, value);
            }
        }
        self.watchers.broadcast_updated(key, value);
    }
}

/// A mapping from string keys to [`State`] containers.
///
/// Cloning a `Store` creates a new handle to the **same** store.
///
/// Keys are created by [`Store::set_state`] or on demand by
/// [`Store::get_state`] with a default, and live until [`Store::remove`]
/// or [`Store::clear`]. A removed container is never reused: setting the
/// key again creates a fresh container with no subscribers.
pub struct Store<V = Json> {
    inner: Arc<StoreInner<V>>,
}

impl<V> Clone for Store<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("keys", &self.inner.entries.read().keys().collect::<Vec<_>>())
            .field("persistence", &self.inner.persistence.read().is_some())
            .finish()
    }
}

impl Store<Json> {
    /// The process-wide store, created on first use and never dropped.
    pub fn global() -> &'static Store {
        static GLOBAL: OnceLock<Store> = OnceLock::new();
        GLOBAL.get_or_init(Store::new)
    }
}

impl<V> Default for Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: RwLock::new(IndexMap::new()),
                subscribers: Mutex::new(Vec::new()),
                watchers: WatchManager::new(),
                persistence: RwLock::new(None),
            }),
        }
    }

    /// Create a store with initial keys, in iteration order.
    pub fn with_states<K: Into<String>>(states: impl IntoIterator<Item = (K, V)>) -> Self {
        let store = Self::new();
        for (key, value) in states {
            store.insert(key.into(), State::new(value), None, false);
        }
        store
    }

    // --- Persistence ---

    /// Register the persistence adapter.
    pub fn persist(&self, config: PersistConfig<V>) {
        debug!(
            persist_entire_store = config.persist_entire_store,
            "persistence configured"
        );
        *self.inner.persistence.write() = Some(config);
    }

    fn adapter(&self) -> Option<Arc<dyn Persistence<V>>> {
        self.inner
            .persistence
            .read()
            .as_ref()
            .map(|config| Arc::clone(&config.adapter))
    }

    // --- State Operations ---

    /// Create the container for `key`, replacing any existing one.
    ///
    /// With persistence enabled a stored value wins over `initial` (an
    /// initializer is then never run). If nothing is stored, the initial
    /// value is saved right away with `initial = true`.
    pub fn set_state(
        &self,
        key: impl Into<String>,
        initial: impl Into<Initial<V>>,
        options: SetStateOptions,
    ) -> Result<State<V>> {
        let key = key.into();
        let config = self.inner.persistence.read().clone();
        let persist = options.persist.unwrap_or_else(|| {
            config
                .as_ref()
                .map_or(false, |config| config.persist_entire_store)
        });

        if !persist {
            return Ok(self.insert(key, State::from_initial(initial.into()), None, false));
        }

        let adapter = config
            .map(|config| config.adapter)
            .ok_or(StoreError::PersistenceNotConfigured)?;

        match adapter.load_state(&key)? {
            Some(stored) => {
                debug!(key = %key, "loaded persisted state");
                Ok(self.insert(key, State::new(stored), Some(adapter), true))
            }
            None => {
                let state = self.insert(
                    key.clone(),
                    State::from_initial(initial.into()),
                    Some(Arc::clone(&adapter)),
                    true,
                );
                adapter.save_state(&key, &state.get(), true)?;
                Ok(state)
            }
        }
    }

    fn insert(
        &self,
        key: String,
        state: State<V>,
        adapter: Option<Arc<dyn Persistence<V>>>,
        persist: bool,
    ) -> State<V> {
        let unsubscribe = state.subscribe(self.bridge(&key, adapter));
        let entry = Entry {
            state: state.clone(),
            unsubscribe,
            persist,
        };

        let previous = self.inner.entries.write().insert(key.clone(), entry);
        if let Some(previous) = previous {
            previous.unsubscribe.unsubscribe();
        }

        debug!(key = %key, persist, "state created");
        state
    }

    /// The subscription that forwards a container's changes to the store.
    fn bridge(&self, key: &str, adapter: Option<Arc<dyn Persistence<V>>>) -> Subscription<V> {
        let store = Arc::downgrade(&self.inner);
        let key = key.to_string();

        Subscription::observe(move |value: &V| {
            if let Some(inner) = store.upgrade() {
                inner.on_update(&key, value);
            }
            if let Some(adapter) = &adapter {
                if let Err(e) = adapter.save_state(&key, value, false) {
                    warn!(key = %key, error = %e, "failed to persist state");
                }
            }
        })
    }

    /// The container for `key`.
    ///
    /// A missing key is created from `options.default` if one is given,
    /// otherwise this fails with [`StoreError::MissingState`].
    pub fn get_state(&self, key: &str, options: GetStateOptions<V>) -> Result<State<V>> {
        if let Some(state) = self.lookup(key) {
            return Ok(state);
        }

        match options.default {
            Some(default) => self.set_state(
                key,
                default,
                SetStateOptions {
                    persist: options.persist,
                },
            ),
            None => Err(StoreError::MissingState(key.to_string())),
        }
    }

    /// The container for an existing `key`.
    pub fn state(&self, key: &str) -> Result<State<V>> {
        self.get_state(key, GetStateOptions::default())
    }

    /// Current value of an existing `key`.
    pub fn get_state_value(&self, key: &str) -> Result<Arc<V>> {
        Ok(self.state(key)?.get())
    }

    /// Current value of an existing `key`, projected through `selector`.
    pub fn select_state_value<S>(&self, key: &str, selector: impl FnOnce(&V) -> S) -> Result<S> {
        Ok(self.state(key)?.get_with(selector))
    }

    fn lookup(&self, key: &str) -> Option<State<V>> {
        self.inner
            .entries
            .read()
            .get(key)
            .map(|entry| entry.state.clone())
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.entries.read().contains_key(key)
    }

    /// Snapshot of every key, in creation order.
    pub fn items(&self) -> Vec<StoreItem<V>> {
        self.inner
            .entries
            .read()
            .iter()
            .map(|(key, entry)| StoreItem {
                key: key.clone(),
                value: (*entry.state.get()).clone(),
                persist: entry.persist,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.read().is_empty()
    }

    // --- Removal ---

    /// Remove keys. Unknown keys are skipped.
    pub fn remove<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>) {
        self.remove_with(keys, || {});
    }

    /// Remove keys, then run `reinit` before anyone is notified.
    ///
    /// `reinit` may call [`Store::set_state`] for the removed keys. Store
    /// observers then see the re-created values, and subscribers of the old
    /// containers get their refresh callback so they can pick up the new
    /// containers.
    pub fn remove_with<K: AsRef<str>>(&self, keys: impl IntoIterator<Item = K>, reinit: impl FnOnce()) {
        let mut removed = Vec::new();
        {
            let mut entries = self.inner.entries.write();
            for key in keys {
                let key = key.as_ref();
                if let Some(entry) = entries.shift_remove(key) {
                    removed.push((key.to_string(), entry));
                }
            }
        }

        let adapter = self.adapter();
        for (key, entry) in &removed {
            entry.unsubscribe.unsubscribe();
            if entry.persist {
                if let Some(adapter) = &adapter {
                    if let Err(e) = adapter.remove_state(key) {
                        warn!(key = %key, error = %e, "failed to remove persisted state");
                    }
                }
            }
            debug!(key = %key, "state removed");
        }

        reinit();
        self.finish_removal(removed);
    }

    /// Remove every key.
    pub fn clear(&self) {
        self.clear_with(|| {});
    }

    /// Remove every key, then run `reinit` before anyone is notified.
    pub fn clear_with(&self, reinit: impl FnOnce()) {
        let removed: Vec<(String, Entry<V>)> =
            std::mem::take(&mut *self.inner.entries.write()).into_iter().collect();

        if let Some(adapter) = self.adapter() {
            if let Err(e) = adapter.clear() {
                warn!(error = %e, "failed to clear persisted states");
            }
        }
        for (_, entry) in &removed {
            entry.unsubscribe.unsubscribe();
        }
        debug!(removed = removed.len(), "store cleared");

        self.inner.watchers.broadcast_cleared();
        reinit();
        self.finish_removal(removed);
    }

    fn finish_removal(&self, removed: Vec<(String, Entry<V>)>) {
        for (key, entry) in removed {
            match self.lookup(&key) {
                Some(state) => self.inner.on_update(&key, &state.get()),
                None => self.inner.watchers.broadcast_removed(&key),
            }
            entry.state.refresh();
        }
    }

    // --- Subscriptions ---

    /// Observe changes of any key.
    pub fn subscribe(&self, observer: impl Fn(&str, &V) + Send + Sync + 'static) -> Unsubscribe {
        let active = Arc::new(AtomicBool::new(true));
        self.inner.subscribers.lock().push(StoreSubscriber {
            observer: Arc::new(observer),
            active: Arc::clone(&active),
        });

        let inner = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(inner) = inner.upgrade() {
                inner
                    .subscribers
                    .lock()
                    .retain(|s| !Arc::ptr_eq(&s.active, &active));
            }
        })
    }

    /// Receive store events over a bounded channel.
    pub fn watch(&self, config: WatchConfig) -> WatchHandle<V> {
        self.inner.watchers.watch(config)
    }

    pub fn unwatch(&self, id: WatchId) {
        self.inner.watchers.unwatch(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryPersistence;
    use crate::subscriptions::StoreEvent;
    use std::sync::atomic::AtomicUsize;

    fn persisted_store(storage: &Arc<MemoryPersistence<i64>>) -> Store<i64> {
        let store = Store::new();
        store.persist(PersistConfig::new(storage.clone()));
        store
    }

    #[test]
    fn test_set_and_get_state() {
        let store: Store<i64> = Store::new();
        store.set_state("count", 0, SetStateOptions::default()).unwrap();

        let count = store.state("count").unwrap();
        count.set(5);
        assert_eq!(*store.get_state_value("count").unwrap(), 5);
    }

    #[test]
    fn test_get_state_creates_default_once() {
        let store: Store<i64> = Store::new();

        let first = store.get_state("age", GetStateOptions::with_default(18)).unwrap();
        first.set(20);
        let second = store.get_state("age", GetStateOptions::with_default(99)).unwrap();

        assert!(first.ptr_eq(&second));
        assert_eq!(*second.get(), 20);
    }

    #[test]
    fn test_get_missing_state() {
        let store: Store<i64> = Store::new();
        let result = store.state("nope");
        assert!(matches!(result, Err(StoreError::MissingState(key)) if key == "nope"));
    }

    #[test]
    fn test_initializer_not_run_for_existing_key() {
        let store: Store<i64> = Store::with_states([("count", 1)]);
        let runs = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&runs);

        store
            .get_state(
                "count",
                GetStateOptions::with_initializer(move || {
                    r.fetch_add(1, Ordering::SeqCst);
                    0
                }),
            )
            .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_items_in_creation_order() {
        let store: Store<i64> = Store::new();
        store.set_state("b", 2, SetStateOptions::default()).unwrap();
        store.set_state("a", 1, SetStateOptions::default()).unwrap();
        store.set_state("c", 3, SetStateOptions::default()).unwrap();

        let keys: Vec<_> = store.items().into_iter().map(|item| item.key).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_overwrite_detaches_old_container() {
        let store: Store<i64> = Store::new();
        let old = store.set_state("count", 0, SetStateOptions::default()).unwrap();
        store.set_state("count", 10, SetStateOptions::default()).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        store.subscribe(move |_, _| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        old.set(1);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(old.subscriber_count(), 0);
    }

    #[test]
    fn test_store_subscriber_receives_key() {
        let store: Store<i64> = Store::with_states([("count", 0)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let unsubscribe = store.subscribe(move |key, value| sink.lock().push((key.to_string(), *value)));

        store.state("count").unwrap().set(1);
        unsubscribe.unsubscribe();
        store.state("count").unwrap().set(2);

        assert_eq!(*seen.lock(), vec![("count".to_string(), 1)]);
    }

    #[test]
    fn test_persisted_value_wins() {
        let storage = Arc::new(MemoryPersistence::with_entries([("count", 10)]));
        let store = persisted_store(&storage);

        let count = store.set_state("count", 0, SetStateOptions::persist(true)).unwrap();
        assert_eq!(*count.get(), 10);
        assert!(storage.saves().is_empty());
    }

    #[test]
    fn test_initial_save_then_updates() {
        let storage = Arc::new(MemoryPersistence::new());
        let store = persisted_store(&storage);

        let count = store.set_state("count", 0, SetStateOptions::persist(true)).unwrap();
        count.set(1);

        let saves: Vec<_> = storage
            .saves()
            .into_iter()
            .map(|call| (call.value, call.initial))
            .collect();
        assert_eq!(saves, vec![(0, true), (1, false)]);
    }

    #[test]
    fn test_equal_set_neither_saves_nor_fans_out() {
        let storage = Arc::new(MemoryPersistence::new());
        let store = persisted_store(&storage);
        let count = store.set_state("count", 0, SetStateOptions::persist(true)).unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        store.subscribe(move |_, _| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        count.set(0);
        count.set(0);

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(storage.saves().len(), 1);
    }

    #[test]
    fn test_json_update_shares_untouched_subtrees() {
        let store: Store = Store::new();
        let doc = store
            .set_state(
                "doc",
                serde_json::json!({"big": vec![1; 1000], "n": 1}),
                SetStateOptions::default(),
            )
            .unwrap();

        let before = doc.get();
        doc.update(|draft| draft["n"] = Json::from(2));
        let after = store.get_state_value("doc").unwrap();

        assert_eq!(after["n"].as_i64(), Some(2));
        assert!(before["big"].ptr_eq(&after["big"]));
    }

    #[test]
    fn test_persist_entire_store_default() {
        let storage = Arc::new(MemoryPersistence::<i64>::new());
        let store: Store<i64> = Store::new();
        store.persist(PersistConfig::new(storage.clone()).persist_entire_store(true));

        store.set_state("a", 1, SetStateOptions::default()).unwrap();
        store.set_state("b", 2, SetStateOptions::persist(false)).unwrap();

        assert!(storage.contains("a"));
        assert!(!storage.contains("b"));
    }

    #[test]
    fn test_persist_without_adapter() {
        let store: Store<i64> = Store::new();
        let result = store.set_state("count", 0, SetStateOptions::persist(true));
        assert!(matches!(result, Err(StoreError::PersistenceNotConfigured)));
        assert!(!store.has("count"));
    }

    #[test]
    fn test_remove_persisted_key() {
        let storage = Arc::new(MemoryPersistence::new());
        let store = persisted_store(&storage);
        store.set_state("count", 0, SetStateOptions::persist(true)).unwrap();

        store.remove(["count"]);
        assert!(!store.has("count"));
        assert!(!storage.contains("count"));
    }

    #[test]
    fn test_remove_unknown_key_is_skipped() {
        let store: Store<i64> = Store::with_states([("a", 1)]);
        store.remove(["missing", "a"]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_with_reinit() {
        let store: Store<i64> = Store::with_states([("count", 0)]);
        let old = store.state("count").unwrap();
        old.set(1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.subscribe(move |key, value| sink.lock().push((key.to_string(), *value)));

        let refreshed = Arc::new(Mutex::new(Vec::new()));
        let (lookup, sink) = (store.clone(), Arc::clone(&refreshed));
        old.subscribe(Subscription::refresh_only(move || {
            sink.lock().push(*lookup.get_state_value("count").unwrap());
        }));

        let reinit_store = store.clone();
        store.remove_with(["count"], move || {
            reinit_store
                .set_state("count", 5, SetStateOptions::default())
                .unwrap();
        });

        assert_eq!(*seen.lock(), vec![("count".to_string(), 5)]);
        assert_eq!(*refreshed.lock(), vec![5]);
        assert!(!store.state("count").unwrap().ptr_eq(&old));
    }

    #[test]
    fn test_clear_with_reinit() {
        let store: Store<i64> = Store::with_states([("count", 0), ("age", 18)]);
        let storage = Arc::new(MemoryPersistence::<i64>::with_entries([("x", 1)]));
        store.persist(PersistConfig::new(storage.clone()));

        let reinit_store = store.clone();
        store.clear_with(move || {
            reinit_store
                .set_state("count", 5, SetStateOptions::default())
                .unwrap();
        });

        assert_eq!(store.keys(), vec!["count"]);
        assert_eq!(*store.get_state_value("count").unwrap(), 5);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_watch_events() {
        let store: Store<i64> = Store::with_states([("count", 0), ("age", 18)]);
        let handle = store.watch(WatchConfig::default());

        store.state("count").unwrap().set(1);
        store.remove(["age"]);

        let events = handle.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], StoreEvent::Updated { key, value: 1 } if key == "count"));
        assert!(matches!(&events[1], StoreEvent::Removed { key } if key == "age"));

        store.unwatch(handle.id);
    }

    #[test]
    fn test_global_store_is_shared() {
        let key = "store::tests::global";
        Store::global()
            .set_state(key, serde_json::json!({"ok": true}), SetStateOptions::default())
            .unwrap();
        assert!(Store::global().has(key));
        Store::global().remove([key]);
    }
}
