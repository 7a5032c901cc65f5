//! Benchmarks for ChainKV table operations

use chainkv::{Config, Record, Table};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tempfile::TempDir;

fn open_table(dir: &TempDir, flush_interval: usize) -> Table {
    let config = Config::builder()
        .data_dir(dir.path())
        .shard_capacity(10_007)
        .flush_interval(flush_interval)
        .build();
    Table::open(&config, "bench").unwrap()
}

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("batched_put_1k", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let table = open_table(&dir, 100);
                (dir, table)
            },
            |(_dir, mut table)| {
                table.begin_batch();
                for i in 0..1_000 {
                    table.put(Record::new(format!("key_{}", i), "value")).unwrap();
                }
                table.end_batch().unwrap();
            },
            BatchSize::PerIteration,
        )
    });

    let dir = TempDir::new().unwrap();
    let mut table = open_table(&dir, 1_000);
    table.begin_batch();
    for i in 0..10_000 {
        table.put(Record::new(format!("key_{}", i), "value")).unwrap();
    }
    table.end_batch().unwrap();

    let mut i = 0u64;
    c.bench_function("get_hit", |b| {
        b.iter(|| {
            i = (i + 7_919) % 10_000;
            table.get(&format!("key_{}", i)).unwrap()
        })
    });

    c.bench_function("get_miss", |b| b.iter(|| table.get("missing").unwrap()));

    c.bench_function("put_list", |b| {
        b.iter(|| table.put_list("adjacency", "node").unwrap())
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
