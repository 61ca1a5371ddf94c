//! Property tests for state containers and the store.
//!
//! 1. An update that touches nothing keeps the snapshot and notifies nobody.
//! 2. A selected observer fires exactly when its selection changes.
//! 3. A lens update leaves the unselected parts of the value shared.
//! 4. Nothing is delivered after unsubscribe.
//! 5. `get_state` with a default creates a key once.

use proptest::prelude::*;
use state_pool::{GetStateOptions, Lens, SetValue, State, Store, Subscription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq)]
struct Profile {
    name: Arc<String>,
    tags: Arc<Vec<String>>,
    age: u32,
}

fn profile_strategy() -> impl Strategy<Value = Profile> {
    (
        "[a-z]{1,8}",
        proptest::collection::vec("[a-z]{1,4}", 0..4),
        0u32..120,
    )
        .prop_map(|(name, tags, age)| Profile {
            name: Arc::new(name),
            tags: Arc::new(tags),
            age,
        })
}

fn counter(state: &State<Profile>, selector: fn(&Profile) -> u32) -> Arc<AtomicUsize> {
    let hits = Arc::new(AtomicUsize::new(0));
    let h = Arc::clone(&hits);
    state.subscribe(Subscription::select(selector, move |_| {
        h.fetch_add(1, Ordering::SeqCst);
    }));
    hits
}

proptest! {
    #[test]
    fn untouched_update_keeps_snapshot(profile in profile_strategy()) {
        let state = State::new(profile);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        state.observe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let before = state.get();
        state.update(|draft| {
            let _age = draft.age;
        });

        prop_assert!(Arc::ptr_eq(&before, &state.get()));
        prop_assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn selected_observer_fires_on_change(
        profile in profile_strategy(),
        ages in proptest::collection::vec(0u32..5, 1..10),
    ) {
        let state = State::new(profile);
        let age_hits = counter(&state, |p| p.age);

        let mut expected = 0;
        for age in ages {
            if state.get().age != age {
                expected += 1;
            }
            state.update(|draft| draft.age = age);
        }

        prop_assert_eq!(age_hits.load(Ordering::SeqCst), expected);
    }

    #[test]
    fn lens_update_shares_unselected_fields(profile in profile_strategy(), delta in 1u32..10) {
        let state = State::new(profile);
        let age = Lens::new(|p: &Profile| p.age, |p: &mut Profile, age| p.age = age);

        let before = state.get();
        state.set_with(&age, SetValue::updater(move |a: &u32| a + delta));
        let after = state.get();

        prop_assert_eq!(after.age, before.age + delta);
        prop_assert!(Arc::ptr_eq(&before.name, &after.name));
        prop_assert!(Arc::ptr_eq(&before.tags, &after.tags));
    }

    #[test]
    fn nothing_delivered_after_unsubscribe(
        values in proptest::collection::vec(any::<i64>(), 1..10),
        cut in 0usize..10,
    ) {
        let state = State::new(0i64);
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let unsubscribe = state.observe(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        let cut = cut.min(values.len());
        for (i, value) in values.into_iter().enumerate() {
            if i == cut {
                unsubscribe.unsubscribe();
            }
            state.set(value);
        }

        prop_assert_eq!(hits.load(Ordering::SeqCst), cut);
    }

    #[test]
    fn default_creates_key_once(key in "[a-z]{1,8}", readers in 1usize..8) {
        let store: Store<i64> = Store::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut states = Vec::new();
        for _ in 0..readers {
            let c = Arc::clone(&calls);
            let options = GetStateOptions::with_initializer(move || {
                c.fetch_add(1, Ordering::SeqCst);
                7
            });
            states.push(store.get_state(&key, options).unwrap());
        }

        prop_assert_eq!(calls.load(Ordering::SeqCst), 1);
        prop_assert!(states.iter().all(|s| s.ptr_eq(&states[0])));
        prop_assert_eq!(store.len(), 1);
    }
}
