//! Performance benchmarks for state containers and the store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use state_pool::{GetStateOptions, Lens, SetStateOptions, State, Store, Subscription};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone, Default)]
struct Document {
    title: Arc<String>,
    sections: Arc<Vec<Arc<String>>>,
    revision: u64,
}

fn create_document(sections: usize) -> Document {
    Document {
        title: Arc::new("bench".to_string()),
        sections: Arc::new((0..sections).map(|i| Arc::new(format!("section {}", i))).collect()),
        revision: 0,
    }
}

/// Benchmark notification fan-out with varying subscriber counts
fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for subscribers in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("selected_subscribers", subscribers),
            &subscribers,
            |b, &count| {
                let state = State::new(create_document(10));
                // Half watch the revision, half watch the title
                for i in 0..count {
                    let subscription = if i % 2 == 0 {
                        Subscription::select(|d: &Document| d.revision, |r| {
                            black_box(r);
                        })
                    } else {
                        Subscription::select(
                            |d: &Document| Arc::clone(&d.title),
                            |t| {
                                black_box(t);
                            },
                        )
                    };
                    state.subscribe(subscription);
                }

                b.iter(|| {
                    state.update(|draft| draft.revision += 1);
                });
            },
        );
    }

    group.finish();
}

/// Benchmark structural updates with varying value sizes
fn bench_structural_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_update");

    for sections in [10, 1000, 10000] {
        group.bench_with_input(
            BenchmarkId::new("lens_revision", sections),
            &sections,
            |b, &size| {
                let state = State::new(create_document(size));
                let revision = Lens::new(
                    |d: &Document| d.revision,
                    |d: &mut Document, r| d.revision = r,
                );

                b.iter(|| {
                    state.update_with(&revision, |draft| **draft += 1);
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("edit_one_section", sections),
            &sections,
            |b, &size| {
                let state = State::new(create_document(size));

                b.iter(|| {
                    state.update(|draft| {
                        let sections = Arc::make_mut(&mut draft.sections);
                        sections[0] = Arc::new("edited".to_string());
                    });
                });
            },
        );
    }

    group.finish();
}

/// Benchmark store reads and writes
fn bench_store(c: &mut Criterion) {
    let store: Store = Store::new();
    for i in 0..1000 {
        store
            .set_state(format!("key-{}", i), json!({"n": i}), SetStateOptions::default())
            .unwrap();
    }

    c.bench_function("store_get_state", |b| {
        b.iter(|| {
            black_box(store.get_state("key-500", GetStateOptions::default()).unwrap());
        });
    });

    let state = store.state("key-500").unwrap();
    c.bench_function("store_bridged_set", |b| {
        let mut n = 0;
        b.iter(|| {
            n += 1;
            state.set(json!({"n": n}));
        });
    });
}

criterion_group!(benches, bench_fan_out, bench_structural_update, bench_store);
criterion_main!(benches);
