//! Copy-on-write update application.
//!
//! A [`Draft`] starts out pointing at the current value. Reading goes
//! through the shared `Arc`; the first mutable access detaches a shallow
//! clone. Fields that are themselves behind an `Arc` keep pointing at the
//! same allocation, so every subtree the mutation does not touch is shared
//! between the old and the new value.

use crate::types::Lens;
use std::convert::Infallible;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Mutable view of a value being updated.
///
/// Any mutable access (through `DerefMut`, [`Draft::replace`] or
/// [`Draft::delete`]) marks the draft modified, even if the bytes end up
/// equal. An untouched draft produces the original `Arc`.
pub struct Draft<T> {
    base: Arc<T>,
    value: Arc<T>,
    modified: bool,
}

impl<T> Draft<T> {
    fn new(base: &Arc<T>) -> Self {
        Self {
            base: Arc::clone(base),
            value: Arc::clone(base),
            modified: false,
        }
    }

    /// The value the draft was created from.
    pub fn original(&self) -> &T {
        &self.base
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Replace the whole drafted value.
    pub fn replace(&mut self, value: T) {
        self.value = Arc::new(value);
        self.modified = true;
    }

    fn finish(self) -> Arc<T> {
        if self.modified {
            self.value
        } else {
            self.base
        }
    }
}

impl<T: PartialEq> Draft<T> {
    /// Replace the drafted value unless it already equals `value`. An equal
    /// value leaves the draft untouched.
    pub fn assign(&mut self, value: T) {
        if *self.value != value {
            self.replace(value);
        }
    }
}

impl<T: Default> Draft<T> {
    /// Delete the value. The result is the empty value `T::default()`,
    /// which for `Option` payloads is `None`.
    pub fn delete(&mut self) {
        self.replace(T::default());
    }
}

impl<T> Deref for Draft<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone> DerefMut for Draft<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.modified = true;
        // `base` always holds a second reference, so the first call clones
        // and the original value is never written through.
        Arc::make_mut(&mut self.value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Draft<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Draft")
            .field("value", &self.value)
            .field("modified", &self.modified)
            .finish()
    }
}

/// Apply `recipe` to a draft of `base`.
///
/// Returns `base` itself (pointer-equal) when the recipe did not touch the
/// draft.
pub fn produce<T, F>(base: &Arc<T>, recipe: F) -> Arc<T>
where
    T: Clone,
    F: FnOnce(&mut Draft<T>),
{
    let result: Result<Arc<T>, Infallible> = try_produce(base, |draft| {
        recipe(draft);
        Ok(())
    });
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}

/// Fallible [`produce`]. On `Err` the draft is discarded.
pub fn try_produce<T, E, F>(base: &Arc<T>, recipe: F) -> Result<Arc<T>, E>
where
    T: Clone,
    F: FnOnce(&mut Draft<T>) -> Result<(), E>,
{
    let mut draft = Draft::new(base);
    recipe(&mut draft)?;
    Ok(draft.finish())
}

/// Apply `recipe` to the sub-value `lens` selects, then patch the result
/// back into a draft of `base`.
///
/// If the recipe leaves the selection untouched the patcher is not run and
/// `base` is returned unchanged.
pub fn try_produce_through<T, S, E, F>(base: &Arc<T>, lens: &Lens<T, S>, recipe: F) -> Result<Arc<T>, E>
where
    T: Clone,
    S: Clone,
    F: FnOnce(&mut Draft<S>) -> Result<(), E>,
{
    let selected = Arc::new(lens.get(base));
    let updated = try_produce(&selected, recipe)?;
    if Arc::ptr_eq(&selected, &updated) {
        return Ok(Arc::clone(base));
    }
    drop(selected);

    let updated = Arc::try_unwrap(updated).unwrap_or_else(|shared| (*shared).clone());
    Ok(produce(base, |draft| lens.patch(draft, updated)))
}

/// Infallible [`try_produce_through`].
pub fn produce_through<T, S, F>(base: &Arc<T>, lens: &Lens<T, S>, recipe: F) -> Arc<T>
where
    T: Clone,
    S: Clone,
    F: FnOnce(&mut Draft<S>),
{
    let result: Result<Arc<T>, Infallible> = try_produce_through(base, lens, |draft| {
        recipe(draft);
        Ok(())
    });
    match result {
        Ok(value) => value,
        Err(never) => match never {},
    }
}
