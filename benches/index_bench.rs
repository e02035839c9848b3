//! Benchmarks for SeqId generation, entry encoding and scans
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use seqidx::index::{Collection, IndexEntry, Indexer};
use seqidx::record::Record;
use seqidx::seqid::{SeqId, SeqIdGenerator};
use seqidx::store::{MemoryStore, SqliteStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Sample {
    seq_id: Option<SeqId>,
    sensor: i64,
    payload: String,
}

impl Record for Sample {
    const TABLE: &'static str = "samples";
    const COLUMNS: &'static [&'static str] = &["seq_id", "sensor", "payload"];
    const KEY: &'static [&'static str] = &["seq_id"];

    fn seq_id(&self) -> Option<SeqId> {
        self.seq_id
    }

    fn set_seq_id(&mut self, id: SeqId) {
        self.seq_id = Some(id);
    }
}

fn sample(i: usize) -> Sample {
    Sample {
        seq_id: None,
        sensor: (i % 4) as i64,
        payload: format!("reading {}", i),
    }
}

fn bench_seq_id(c: &mut Criterion) {
    let mut group = c.benchmark_group("seq_id");
    let generator = SeqIdGenerator::new(1).unwrap();

    group.throughput(Throughput::Elements(1));
    group.bench_function("next", |b| b.iter(|| generator.next().unwrap()));

    let id = generator.next().unwrap();
    group.bench_function("render", |b| b.iter(|| black_box(id).to_string()));

    let text = id.to_string();
    group.bench_function("parse", |b| {
        b.iter(|| black_box(&text).parse::<SeqId>().unwrap())
    });

    group.finish();
}

fn bench_entry(c: &mut Criterion) {
    let mut group = c.benchmark_group("entry");
    let generator = SeqIdGenerator::new(1).unwrap();

    let mut foreign_key = BTreeMap::new();
    foreign_key.insert("seq_id".to_string(), b"\"0a3kx9z0c41pq\"".to_vec());
    let entry = IndexEntry::new(
        vec![b"1001".to_vec(), b"\"open:pending\"".to_vec()],
        generator.next().unwrap(),
        foreign_key,
    );

    group.bench_function("encode", |b| b.iter(|| black_box(&entry).encode()));

    let row = entry.encode();
    group.bench_function("decode", |b| {
        b.iter(|| IndexEntry::decode(black_box(row.clone())).unwrap())
    });

    group.finish();
}

fn bench_scan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    let mut group = c.benchmark_group("scan");

    for size in [1_000, 10_000] {
        let samples = rt.block_on(async {
            let generator = Arc::new(SeqIdGenerator::new(1).unwrap());
            let mut samples =
                Collection::<Sample>::open(Arc::new(MemoryStore::new()), generator)
                    .await
                    .unwrap();
            samples.add_index(Indexer::Chronological).await.unwrap();
            for i in 0..size {
                samples.insert(&mut sample(i)).await.unwrap();
            }
            samples
        });
        let seq = samples.index("seq").unwrap();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_function(format!("memory_full_{}", size), |b| {
            b.iter(|| {
                rt.block_on(async {
                    let all = seq.scan().page_size(1_000).start().unwrap();
                    all.collect_all().await.unwrap().len()
                })
            })
        });
    }

    group.bench_function("sqlite_insert", |b| {
        b.iter_custom(|iters| {
            rt.block_on(async {
                let dir = tempdir().unwrap();
                let store = SqliteStore::open(&dir.path().join("bench.db")).unwrap();
                let generator = Arc::new(SeqIdGenerator::new(1).unwrap());
                let mut samples = Collection::<Sample>::open(Arc::new(store), generator)
                    .await
                    .unwrap();
                samples.add_index(Indexer::Chronological).await.unwrap();
                samples
                    .add_index(Indexer::by_columns(["sensor"]))
                    .await
                    .unwrap();

                let start = std::time::Instant::now();

                for i in 0..iters {
                    samples.insert(&mut sample(i as usize)).await.unwrap();
                }

                start.elapsed()
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_seq_id, bench_entry, bench_scan);
criterion_main!(benches);
