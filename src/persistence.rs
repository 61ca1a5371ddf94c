//! Persistence adapters for the store.
//!
//! The store never touches storage itself. Keys created with persistence
//! enabled are loaded through [`Persistence::load_state`] when they are
//! created and written through [`Persistence::save_state`] after every
//! change. Timing concerns like debouncing belong to the adapter.

use crate::error::Result;
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Storage backend for persisted keys.
pub trait Persistence<V>: Send + Sync {
    /// Save `value` under `key`. `initial` is true for the first save made
    /// when the key is created without a stored value.
    fn save_state(&self, key: &str, value: &V, initial: bool) -> Result<()>;

    /// Load the stored value for `key`, `None` if nothing is stored.
    fn load_state(&self, key: &str) -> Result<Option<V>>;

    fn remove_state(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Persistence configuration for a store.
pub struct PersistConfig<V> {
    pub adapter: Arc<dyn Persistence<V>>,
    /// Persist keys whose `set_state` call doesn't say otherwise.
    /// Default: false
    pub persist_entire_store: bool,
}

impl<V> PersistConfig<V> {
    pub fn new(adapter: Arc<dyn Persistence<V>>) -> Self {
        Self {
            adapter,
            persist_entire_store: false,
        }
    }

    pub fn persist_entire_store(mut self, persist: bool) -> Self {
        self.persist_entire_store = persist;
        self
    }
}

impl<V> Clone for PersistConfig<V> {
    fn clone(&self) -> Self {
        Self {
            adapter: Arc::clone(&self.adapter),
            persist_entire_store: self.persist_entire_store,
        }
    }
}

impl<V> fmt::Debug for PersistConfig<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistConfig")
            .field("persist_entire_store", &self.persist_entire_store)
            .finish_non_exhaustive()
    }
}

/// A recorded `save_state` call.
#[derive(Clone, Debug, PartialEq)]
pub struct SaveCall<V> {
    pub key: String,
    pub value: V,
    pub initial: bool,
}

/// In-memory adapter that also records every save.
pub struct MemoryPersistence<V> {
    entries: Mutex<IndexMap<String, V>>,
    saves: Mutex<Vec<SaveCall<V>>>,
}

impl<V: Clone> MemoryPersistence<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            saves: Mutex::new(Vec::new()),
        }
    }

    /// Start with values already stored.
    pub fn with_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        let storage = Self::new();
        storage
            .entries
            .lock()
            .extend(entries.into_iter().map(|(k, v)| (k.into(), v)));
        storage
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Every save made so far, oldest first.
    pub fn saves(&self) -> Vec<SaveCall<V>> {
        self.saves.lock().clone()
    }
}

impl<V: Clone> Default for MemoryPersistence<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> Persistence<V> for MemoryPersistence<V> {
    fn save_state(&self, key: &str, value: &V, initial: bool) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.clone());
        self.saves.lock().push(SaveCall {
            key: key.to_string(),
            value: value.clone(),
            initial,
        });
        Ok(())
    }

    fn load_state(&self, key: &str) -> Result<Option<V>> {
        Ok(self.get(key))
    }

    fn remove_state(&self, key: &str) -> Result<()> {
        self.entries.lock().shift_remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }
}

type SaveFn<V> = Box<dyn Fn(&str, &V, bool) -> Result<()> + Send + Sync>;
type LoadFn<V> = Box<dyn Fn(&str) -> Result<Option<V>> + Send + Sync>;
type RemoveFn = Box<dyn Fn(&str) -> Result<()> + Send + Sync>;
type ClearFn = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Adapter assembled from closures.
pub struct FnPersistence<V> {
    save: SaveFn<V>,
    load: LoadFn<V>,
    remove: Option<RemoveFn>,
    clear: Option<ClearFn>,
}

impl<V> FnPersistence<V> {
    pub fn new(
        save: impl Fn(&str, &V, bool) -> Result<()> + Send + Sync + 'static,
        load: impl Fn(&str) -> Result<Option<V>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            save: Box::new(save),
            load: Box::new(load),
            remove: None,
            clear: None,
        }
    }

    pub fn with_remove(mut self, remove: impl Fn(&str) -> Result<()> + Send + Sync + 'static) -> Self {
        self.remove = Some(Box::new(remove));
        self
    }

    pub fn with_clear(mut self, clear: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        self.clear = Some(Box::new(clear));
        self
    }
}

impl<V> Persistence<V> for FnPersistence<V> {
    fn save_state(&self, key: &str, value: &V, initial: bool) -> Result<()> {
        (self.save)(key, value, initial)
    }

    fn load_state(&self, key: &str) -> Result<Option<V>> {
        (self.load)(key)
    }

    fn remove_state(&self, key: &str) -> Result<()> {
        match &self.remove {
            Some(remove) => remove(key),
            None => Ok(()),
        }
    }

    fn clear(&self) -> Result<()> {
        match &self.clear {
            Some(clear) => clear(),
            None => Ok(()),
        }
    }
}
