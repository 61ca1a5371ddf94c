//! Subscriptions to containers and the store.
//!
//! Two kinds of subscribers exist:
//! - [`Subscription`]: a synchronous callback on one state container,
//!   scoped by a selector so it only fires when its selection changes
//! - store watchers: bounded channels receiving [`StoreEvent`]s for every
//!   key, with slow watchers dropped instead of blocking updates
//!
//! # Example
//!
//! ```ignore
//! let store: Store<i64> = Store::new();
//! let handle = store.watch(WatchConfig::default());
//!
//! store.set_state("count", 0, SetStateOptions::default())?;
//! store.get_state("count", GetStateOptions::default())?.set(1);
//!
//! for event in handle.drain() {
//!     if let StoreEvent::Updated { key, value } = event {
//!         println!("{key} = {value}");
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::WatchManager;
pub use types::{
    DropReason, StoreEvent, Subscription, SubscriptionId, Unsubscribe, WatchConfig, WatchHandle,
    WatchId,
};
