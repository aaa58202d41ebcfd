use std::collections::HashMap as StdHashMap;
use std::hint::black_box;
use std::sync::Arc;
use std::thread;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;
use criterion::Throughput;
use densemap::DenseMap;
use densemap::ShardedMap;
use hashbrown::HashMap as HashbrownHashMap;
use rand::rngs::OsRng;
use rand::TryRngCore;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct TestKey(String);

impl TestKey {
    fn new(key: u64) -> Self {
        black_box(TestKey(format!("key_{key}")))
    }
}

const SIZES: &[usize] = &[1 << 10, 1 << 15, 1 << 19];

fn bench_insert_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential");

    for &size in SIZES {
        let items: Vec<(TestKey, u64)> = (0..size as u64).map(|i| (TestKey::new(i), i)).collect();
        group.throughput(Throughput::Elements(size as u64));

        group.bench_function(format!("densemap/{size}"), |b| {
            b.iter(|| {
                let mut map: DenseMap<TestKey, u64> = DenseMap::with_capacity(size);
                for (key, value) in items.iter() {
                    map.insert(key.clone(), *value);
                }
                black_box(map.len())
            })
        });

        group.bench_function(format!("std/{size}"), |b| {
            b.iter(|| {
                let mut map = StdHashMap::with_capacity(size);
                for (key, value) in items.iter() {
                    map.insert(key.clone(), *value);
                }
                black_box(map.len())
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                let mut map = HashbrownHashMap::with_capacity(size);
                for (key, value) in items.iter() {
                    map.insert(key.clone(), *value);
                }
                black_box(map.len())
            })
        });
    }

    group.finish();
}

fn bench_lookup_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_hit");

    for &size in SIZES {
        let items: Vec<(TestKey, u64)> = (0..size as u64).map(|i| (TestKey::new(i), i)).collect();
        group.throughput(Throughput::Elements(size as u64));

        let mut dense: DenseMap<TestKey, u64> = DenseMap::with_capacity(size);
        let mut std_map = StdHashMap::with_capacity(size);
        let mut brown = HashbrownHashMap::with_capacity(size);
        for (key, value) in items.iter() {
            dense.insert(key.clone(), *value);
            std_map.insert(key.clone(), *value);
            brown.insert(key.clone(), *value);
        }

        group.bench_function(format!("densemap/{size}"), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (key, _) in items.iter() {
                    sum = sum.wrapping_add(*dense.get(key).unwrap());
                }
                black_box(sum)
            })
        });

        group.bench_function(format!("std/{size}"), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (key, _) in items.iter() {
                    sum = sum.wrapping_add(*std_map.get(key).unwrap());
                }
                black_box(sum)
            })
        });

        group.bench_function(format!("hashbrown/{size}"), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (key, _) in items.iter() {
                    sum = sum.wrapping_add(*brown.get(key).unwrap());
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_iterate(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    for &size in SIZES {
        group.throughput(Throughput::Elements(size as u64));

        // Heavy churn before measuring: dense iteration should not care.
        let mut dense: DenseMap<u64, u64> = DenseMap::with_capacity(size);
        let mut std_map: StdHashMap<u64, u64> = StdHashMap::with_capacity(size);
        for i in 0..(2 * size as u64) {
            dense.insert(i, i);
            std_map.insert(i, i);
        }
        for i in 0..(2 * size as u64) {
            if i % 2 == 0 {
                dense.remove(&i);
                std_map.remove(&i);
            }
        }

        group.bench_function(format!("densemap/{size}"), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, value) in &dense {
                    sum = sum.wrapping_add(*value);
                }
                black_box(sum)
            })
        });

        group.bench_function(format!("std/{size}"), |b| {
            b.iter(|| {
                let mut sum = 0u64;
                for (_, value) in &std_map {
                    sum = sum.wrapping_add(*value);
                }
                black_box(sum)
            })
        });
    }

    group.finish();
}

fn bench_sharded_multithreaded(c: &mut Criterion) {
    let mut group = c.benchmark_group("sharded_insert");
    const PER_THREAD: u64 = 10_000;

    for &threads in &[1usize, 4, 8] {
        group.throughput(Throughput::Elements(threads as u64 * PER_THREAD));
        let mut rng = OsRng;
        let seed = rng.try_next_u64().unwrap();

        group.bench_function(format!("densemap_sharded/{threads}threads"), |b| {
            b.iter(|| {
                let map: Arc<ShardedMap<u64, u64>> = Arc::new(ShardedMap::new());
                let handles: Vec<_> = (0..threads as u64)
                    .map(|t| {
                        let map = Arc::clone(&map);
                        thread::spawn(move || {
                            for i in 0..PER_THREAD {
                                map.insert(seed ^ (t * PER_THREAD + i), i);
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
                black_box(map.len())
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insert_sequential,
    bench_lookup_hit,
    bench_iterate,
    bench_sharded_multithreaded
);
criterion_main!(benches);
