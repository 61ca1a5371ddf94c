//! Core types shared by state containers and the store.

use std::fmt;
use std::sync::Arc;

/// Projects a sub-value out of a whole value.
pub type Selector<T, S> = Arc<dyn Fn(&T) -> S + Send + Sync>;

/// Writes an updated sub-value back into a mutable draft of the whole value.
pub type Patcher<T, S> = Arc<dyn Fn(&mut T, S) + Send + Sync>;

/// Host callback that forces an observer's owner to re-read its state.
pub type Refresh = Arc<dyn Fn() + Send + Sync>;

/// Observer for store-level changes, called with the key and its new value.
pub type StoreObserver<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

/// A selector paired with the patcher that writes the selection back.
///
/// Operations that take a lens run the mutation against the selected
/// sub-value and then patch the result into the whole value.
pub struct Lens<T, S> {
    selector: Selector<T, S>,
    patcher: Patcher<T, S>,
}

impl<T, S> Lens<T, S> {
    pub fn new(
        selector: impl Fn(&T) -> S + Send + Sync + 'static,
        patcher: impl Fn(&mut T, S) + Send + Sync + 'static,
    ) -> Self {
        Self {
            selector: Arc::new(selector),
            patcher: Arc::new(patcher),
        }
    }

    /// Read the selected sub-value.
    pub fn get(&self, whole: &T) -> S {
        (self.selector)(whole)
    }

    /// Write `value` into `whole`.
    pub fn patch(&self, whole: &mut T, value: S) {
        (self.patcher)(whole, value)
    }

    pub fn selector(&self) -> Selector<T, S> {
        Arc::clone(&self.selector)
    }
}

impl<T, S> Clone for Lens<T, S> {
    fn clone(&self) -> Self {
        Self {
            selector: Arc::clone(&self.selector),
            patcher: Arc::clone(&self.patcher),
        }
    }
}

impl<T, S> fmt::Debug for Lens<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lens").finish_non_exhaustive()
    }
}

/// New value for a `set` call: either the value itself or a function of
/// the current value.
pub enum SetValue<T> {
    Value(T),
    Updater(Box<dyn FnOnce(&T) -> T>),
}

impl<T> SetValue<T> {
    pub fn updater(f: impl FnOnce(&T) -> T + 'static) -> Self {
        SetValue::Updater(Box::new(f))
    }

    /// Resolve against the current value.
    pub fn resolve(self, current: &T) -> T {
        match self {
            SetValue::Value(value) => value,
            SetValue::Updater(f) => f(current),
        }
    }
}

impl<T> From<T> for SetValue<T> {
    fn from(value: T) -> Self {
        SetValue::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SetValue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetValue::Value(v) => f.debug_tuple("Value").field(v).finish(),
            SetValue::Updater(_) => f.write_str("Updater(..)"),
        }
    }
}

/// Initial value for a container: a value, or an initializer that is only
/// run if the value is actually needed.
pub enum Initial<V> {
    Value(V),
    Lazy(Box<dyn FnOnce() -> V>),
}

impl<V> Initial<V> {
    pub fn lazy(f: impl FnOnce() -> V + 'static) -> Self {
        Initial::Lazy(Box::new(f))
    }

    pub fn resolve(self) -> V {
        match self {
            Initial::Value(value) => value,
            Initial::Lazy(f) => f(),
        }
    }
}

impl<V> From<V> for Initial<V> {
    fn from(value: V) -> Self {
        Initial::Value(value)
    }
}

impl<V: fmt::Debug> fmt::Debug for Initial<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Initial::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Initial::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}
