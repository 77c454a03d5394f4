//! Performance benchmarks for harbor-engine

use harbor_engine::{
    clock::system_clock, Action, ActionKind, AppState, Change, EntityTable, Record, Store,
    SyncOperation, SyncQueue, Theme, TtlCache,
};
use std::sync::Arc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

fn client(i: u64) -> Record {
    Record::with_id(json!({"id": format!("c-{}", i), "name": format!("Client {}", i)})).unwrap()
}

fn populated_store(size: u64) -> Store {
    let mut store = Store::new();
    let records = (0..size).map(client).collect();
    store
        .dispatch(ActionKind::LoadRecords {
            table: "clients".into(),
            records,
        })
        .unwrap();
    store
}

fn bench_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("toggle_sidebar", |b| {
        let mut store = Store::new();
        b.iter(|| store.dispatch(black_box(ActionKind::ToggleSidebar)))
    });

    for size in [100u64, 1000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("upsert_into", size), size, |b, &size| {
            let mut store = populated_store(size);
            let mut id = size;

            b.iter(|| {
                id += 1;
                store.dispatch(black_box(Action::new(ActionKind::UpsertRecord {
                    table: "clients".into(),
                    record: client(id),
                })))
            })
        });
    }

    group.finish();
}

fn bench_selectors(c: &mut Criterion) {
    let mut group = c.benchmark_group("selectors");

    for count in [10usize, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("unchanged", count), count, |b, &count| {
            let mut store = populated_store(1000);
            for _ in 0..count {
                store.select(
                    |s: &AppState| s.table("clients").cloned(),
                    |_: &Option<Arc<EntityTable>>, _: &Option<Arc<EntityTable>>| {},
                );
            }

            // Theme changes never touch the clients table, so every selector
            // evaluates but none fires.
            let mut dark = false;
            b.iter(|| {
                dark = !dark;
                let theme = if dark { Theme::Dark } else { Theme::Light };
                store.dispatch(black_box(ActionKind::SetTheme(theme)))
            })
        });
    }

    group.finish();
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    group.bench_function("get_hit", |b| {
        let mut cache = TtlCache::new(system_clock());
        for i in 0..100 {
            cache.set(format!("clients:{}", i), i, None);
        }
        b.iter(|| cache.get(black_box("clients:50")))
    });

    group.bench_function("set_with_eviction", |b| {
        let mut cache = TtlCache::new(system_clock());
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            cache.set(format!("clients:{}", i), black_box(i), None)
        })
    });

    group.finish();
}

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue");

    for size in [100u64, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("to_json", size), size, |b, &size| {
            let mut queue = SyncQueue::new();
            for i in 0..size {
                queue.enqueue(SyncOperation::new(
                    format!("op-{}", i),
                    "clients",
                    Change::Update(client(i)),
                    i,
                ));
            }
            b.iter(|| queue.to_json())
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_selectors,
    bench_cache,
    bench_queue,
);
criterion_main!(benches);
