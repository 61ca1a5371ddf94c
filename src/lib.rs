//! # State Pool
//!
//! Shared reactive state: containers that many observers can read, watch
//! and update, with notifications scoped to the part of the value each
//! observer selected.
//!
//! ## Core Concepts
//!
//! - **State**: a container owning one immutable snapshot and its subscribers
//! - **Draft**: copy-on-write view used by updates; untouched subtrees are
//!   shared, untouched drafts keep the old snapshot
//! - **Lens**: selector + patcher pair for updating part of a value
//! - **DerivedState**: read-only projection of a state through a selector
//! - **Store**: string-keyed registry of states with optional persistence
//! - **Json**: the store's default value type; JSON whose children are
//!   shared between snapshots
//!
//! ## Example
//!
//! ```ignore
//! use state_pool::{Lens, SetValue, State, Subscription};
//!
//! #[derive(Clone)]
//! struct User { name: Arc<String>, age: u32 }
//!
//! let user = State::new(User { name: Arc::new("Yezy".into()), age: 20 });
//!
//! // Only fires when `age` changes
//! user.subscribe(Subscription::select(|u: &User| u.age, |age| println!("age: {age}")));
//!
//! let age = Lens::new(|u: &User| u.age, |u: &mut User, age| u.age = age);
//! user.set_with(&age, SetValue::updater(|a: &u32| a + 1));
//! ```

pub mod error;
pub mod json;
pub mod persistence;
pub mod state;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, StoreError};
pub use json::Json;
pub use persistence::{FnPersistence, MemoryPersistence, PersistConfig, Persistence, SaveCall};
pub use state::{produce, produce_through, try_produce, try_produce_through, DerivedState, Draft, State};
pub use store::{GetStateOptions, SetStateOptions, Store, StoreItem};
pub use subscriptions::{
    DropReason, StoreEvent, Subscription, SubscriptionId, Unsubscribe, WatchConfig, WatchHandle,
    WatchId, WatchManager,
};
pub use types::*;
