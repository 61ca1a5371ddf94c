//! Shared value container with selector-scoped notification.

use crate::state::derived::DerivedState;
use crate::state::operations::{produce, produce_through, try_produce, try_produce_through, Draft};
use crate::subscriptions::{Subscription, Unsubscribe};
use crate::types::{Initial, Lens, SetValue};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// A subscription as registered on one container.
struct Registration<T> {
    subscription: Subscription<T>,
    /// Cleared by unsubscribe; checked right before every delivery.
    active: Arc<AtomicBool>,
}

impl<T> Clone for Registration<T> {
    fn clone(&self) -> Self {
        Self {
            subscription: self.subscription.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<T> Registration<T> {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

struct StateInner<T> {
    /// Current snapshot. Replaced, never written through.
    value: RwLock<Arc<T>>,
    /// Notification order is registration order.
    subscribers: Mutex<Vec<Registration<T>>>,
    /// One mutation in flight per container. Reentrant so an observer may
    /// update the container it is observing.
    ///
    /// Held while observers run. Observers on two threads that update each
    /// other's containers (A notifies into B while B notifies into A) take
    /// the locks in opposite order and can deadlock.
    write_lock: ReentrantMutex<()>,
}

/// A unit of shared mutable state.
///
/// Cloning a `State` creates a new handle to the **same** container.
///
/// Every update replaces the stored `Arc<T>`; a value handed out by
/// [`State::get`] is never modified afterwards. Subscribers are notified
/// synchronously, in registration order, inside the call that changed the
/// value, and only when their selection of the value changed.
pub struct State<T> {
    inner: Arc<StateInner<T>>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("value", &*self.inner.value.read())
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

impl<T> State<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(StateInner {
                value: RwLock::new(Arc::new(value)),
                subscribers: Mutex::new(Vec::new()),
                write_lock: ReentrantMutex::new(()),
            }),
        }
    }

    /// Create from a value or an initializer.
    pub fn from_initial(initial: Initial<T>) -> Self {
        Self::new(initial.resolve())
    }

    // --- Reading ---

    /// The current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.value.read().clone()
    }

    /// Project the current value through `selector`.
    pub fn get_with<S>(&self, selector: impl FnOnce(&T) -> S) -> S {
        let value = self.get();
        selector(&value)
    }

    /// Read-only projection of this container.
    pub fn select<S: 'static>(&self, selector: impl Fn(&T) -> S + Send + Sync + 'static) -> DerivedState<T, S> {
        DerivedState::new(self.clone(), Arc::new(selector))
    }

    /// Whether both handles point at the same container.
    pub fn ptr_eq(&self, other: &State<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // --- Writing ---

    /// Mutate a draft of the value in place.
    pub fn update(&self, mutator: impl FnOnce(&mut Draft<T>)) {
        self.apply(|old| produce(old, mutator));
    }

    /// Mutate a draft of the selected part of the value in place.
    pub fn update_with<S>(&self, lens: &Lens<T, S>, mutator: impl FnOnce(&mut Draft<S>))
    where
        S: Clone,
    {
        self.apply(|old| produce_through(old, lens, mutator));
    }

    /// Fallible [`State::update`]. On `Err` the value is left as it was and
    /// nobody is notified.
    pub fn try_update<E>(
        &self,
        mutator: impl FnOnce(&mut Draft<T>) -> Result<(), E>,
    ) -> Result<(), E> {
        self.try_apply(|old| try_produce(old, mutator))
    }

    /// Fallible [`State::update_with`].
    pub fn try_update_with<S, E>(
        &self,
        lens: &Lens<T, S>,
        mutator: impl FnOnce(&mut Draft<S>) -> Result<(), E>,
    ) -> Result<(), E>
    where
        S: Clone,
    {
        self.try_apply(|old| try_produce_through(old, lens, mutator))
    }

    fn apply(&self, compute: impl FnOnce(&Arc<T>) -> Arc<T>) {
        let result: Result<(), Infallible> = self.try_apply(|old| Ok(compute(old)));
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }

    /// Compute, replace, then notify. `compute` failing or panicking leaves
    /// the stored value untouched.
    fn try_apply<E>(&self, compute: impl FnOnce(&Arc<T>) -> Result<Arc<T>, E>) -> Result<(), E> {
        let _lock = self.inner.write_lock.lock();

        let old = self.get();
        let new = compute(&old)?;
        if Arc::ptr_eq(&old, &new) {
            return Ok(());
        }

        *self.inner.value.write() = Arc::clone(&new);
        self.notify(&old, &new);
        Ok(())
    }

    fn notify(&self, old: &T, new: &T) {
        let subscribers = self.inner.subscribers.lock().clone();
        trace!(subscribers = subscribers.len(), "state changed");

        for registration in &subscribers {
            if registration.is_active() {
                registration.subscription.notify(old, new);
            }
        }
    }

    // --- Subscribing ---

    /// Register a subscription.
    ///
    /// Registering a subscription that is already registered (same
    /// [`SubscriptionId`](crate::SubscriptionId)) keeps the existing
    /// registration.
    pub fn subscribe(&self, subscription: Subscription<T>) -> Unsubscribe {
        let id = subscription.id();
        let active = {
            let mut subscribers = self.inner.subscribers.lock();
            match subscribers.iter().find(|r| r.subscription.id() == id) {
                Some(existing) => Arc::clone(&existing.active),
                None => {
                    let active = Arc::new(AtomicBool::new(true));
                    subscribers.push(Registration {
                        subscription,
                        active: Arc::clone(&active),
                    });
                    active
                }
            }
        };

        let inner = Arc::downgrade(&self.inner);
        Unsubscribe::new(move || {
            active.store(false, Ordering::SeqCst);
            if let Some(inner) = inner.upgrade() {
                inner
                    .subscribers
                    .lock()
                    .retain(|r| !Arc::ptr_eq(&r.active, &active));
            }
        })
    }

    /// Register a bare observer of the whole value.
    pub fn observe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> Unsubscribe {
        self.subscribe(Subscription::observe(observer))
    }

    /// Run every subscriber's refresh callback, regardless of value changes.
    pub fn refresh(&self) {
        let subscribers = self.inner.subscribers.lock().clone();
        for registration in &subscribers {
            if registration.is_active() {
                registration.subscription.refresh();
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl<T> State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    // --- Overwriting ---
    //
    // Writing a value equal to the current one is a no-op: the snapshot is
    // kept and nobody is notified.

    /// Overwrite the value, or compute the new value from the current one.
    pub fn set(&self, value: impl Into<SetValue<T>>) {
        let value = value.into();
        self.apply(|old| produce(old, |draft| draft.assign(value.resolve(old))));
    }

    /// Overwrite the selected part of the value.
    ///
    /// An updater receives the current selection; the result is written
    /// back with the lens's patcher.
    pub fn set_with<S>(&self, lens: &Lens<T, S>, value: impl Into<SetValue<S>>)
    where
        S: Clone + PartialEq,
    {
        let value = value.into();
        self.apply(|old| {
            produce_through(old, lens, |draft| {
                let next = value.resolve(draft);
                draft.assign(next);
            })
        });
    }

    /// Apply `reducer` to the current value and store the result.
    pub fn dispatch<A>(&self, reducer: impl FnOnce(&T, A) -> T, action: A) {
        self.apply(|old| produce(old, |draft| draft.assign(reducer(&**old, action))));
    }

    /// Apply `reducer` to the selected part of the value.
    pub fn dispatch_with<S, A>(&self, lens: &Lens<T, S>, reducer: impl FnOnce(&S, A) -> S, action: A)
    where
        S: Clone + PartialEq,
    {
        self.apply(|old| {
            produce_through(old, lens, |draft| {
                let next = reducer(draft, action);
                draft.assign(next);
            })
        });
    }
}

impl<T> State<T>
where
    T: Clone + Default + Send + Sync + 'static,
{
    /// Replace the value with the empty value `T::default()`.
    pub fn delete(&self) {
        self.update(|draft| draft.delete());
    }
}
