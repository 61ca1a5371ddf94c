//! State containers.
//!
//! A [`State`] owns one immutable snapshot behind an `Arc`. Updates run on a
//! copy-on-write [`Draft`] so unchanged subtrees are shared between the old
//! and new snapshot, and an update that touches nothing keeps the very same
//! `Arc`. That pointer check is what lets a container skip notification
//! entirely, and lets each subscriber skip it when its own selection did not
//! change.

mod container;
mod derived;
mod operations;

pub use container::State;
pub use derived::DerivedState;
pub use operations::{produce, produce_through, try_produce, try_produce_through, Draft};
