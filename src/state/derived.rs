//! Read-only projections of a state container.

use crate::state::container::State;
use crate::subscriptions::{Subscription, Unsubscribe};
use crate::types::Selector;
use std::fmt;
use std::sync::Arc;

/// A [`State`] seen through a fixed selector.
///
/// Holds no value of its own: every read re-derives from the live container.
pub struct DerivedState<T, S> {
    state: State<T>,
    selector: Selector<T, S>,
}

impl<T, S> Clone for DerivedState<T, S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            selector: Arc::clone(&self.selector),
        }
    }
}

impl<T, S> fmt::Debug for DerivedState<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedState").finish_non_exhaustive()
    }
}

impl<T, S> DerivedState<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: 'static,
{
    pub(crate) fn new(state: State<T>, selector: Selector<T, S>) -> Self {
        Self { state, selector }
    }

    /// The selection of the container's current value.
    pub fn get(&self) -> S {
        self.state.get_with(|value| (self.selector)(value))
    }

    /// The container this view reads from.
    pub fn state(&self) -> &State<T> {
        &self.state
    }

    /// Narrow the view further.
    pub fn select<U: 'static>(&self, selector: impl Fn(&S) -> U + Send + Sync + 'static) -> DerivedState<T, U> {
        let outer = Arc::clone(&self.selector);
        DerivedState::new(self.state.clone(), Arc::new(move |value: &T| selector(&outer(value))))
    }
}

impl<T, S> DerivedState<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartialEq + 'static,
{
    /// Observe changes of the selection.
    pub fn subscribe(&self, observer: impl Fn(&S) + Send + Sync + 'static) -> Unsubscribe {
        self.state.subscribe(self.subscription(observer))
    }

    /// Observe changes of the selection, with a host refresh callback.
    pub fn subscribe_with_refresh(
        &self,
        observer: impl Fn(&S) + Send + Sync + 'static,
        refresh: impl Fn() + Send + Sync + 'static,
    ) -> Unsubscribe {
        self.state
            .subscribe(self.subscription(observer).with_refresh(refresh))
    }

    fn subscription(&self, observer: impl Fn(&S) + Send + Sync + 'static) -> Subscription<T> {
        let selector = Arc::clone(&self.selector);
        Subscription::select(move |value: &T| selector(value), observer)
    }
}
