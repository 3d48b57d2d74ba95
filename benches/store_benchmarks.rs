use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;

use eth_tx_observer::blockchain::TransactionFilter;
use eth_tx_observer::models::Transaction;
use eth_tx_observer::storage::{InMemoryStore, Storage};

const SUBSCRIBER: &str = "0xf977814e90da44bfa03b6295a0616a897441acec";

fn create_test_transaction(id: u64) -> Transaction {
    Transaction {
        hash: format!("0x{:064x}", id),
        block_number: 1000 + id / 10,
        from: format!("0x{:040x}", id),
        to: Some(SUBSCRIBER.to_string()),
        value: format!("0x{:x}", (id + 1) * 1_000_000_000),
    }
}

fn bench_store_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_record");

    for size in [1u64, 10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::new("commit_block", size), size, |b, &size| {
            let transactions: Vec<_> = (0..size).map(create_test_transaction).collect();
            b.iter(|| {
                let store = InMemoryStore::default();
                store.add_subscription(SUBSCRIBER);
                let _ = store.commit_block(1000, black_box(&transactions));
            });
        });
    }

    group.finish();
}

fn bench_store_query(c: &mut Criterion) {
    let store = InMemoryStore::default();
    store.add_subscription(SUBSCRIBER);
    let transactions: Vec<_> = (0..1000).map(create_test_transaction).collect();
    store
        .commit_block(1100, &transactions)
        .expect("Failed to populate store");

    let mut group = c.benchmark_group("store_query");

    group.bench_function("transactions_for_address", |b| {
        b.iter(|| {
            let _ = store.get_transactions_for(black_box(SUBSCRIBER));
        });
    });

    group.bench_function("transaction_lookup", |b| {
        b.iter(|| {
            let tx_hash = format!("0x{:064x}", black_box(500));
            let _ = store.get_transaction_by_hash(&tx_hash);
        });
    });

    group.bench_function("stats", |b| {
        b.iter(|| {
            let _ = store.stats();
        });
    });

    group.finish();
}

fn bench_filter_select(c: &mut Criterion) {
    let store: Arc<dyn Storage> = Arc::new(InMemoryStore::default());
    for i in 0..100u64 {
        store.add_subscription(&format!("0x{:040x}", i * 7));
    }
    let filter = TransactionFilter::new(store, Arc::new(NullSink));

    let mut group = c.benchmark_group("filter_select");

    for block_size in [50u64, 200, 500].iter() {
        let block: Vec<_> = (0..*block_size).map(create_test_transaction).collect();
        group.bench_with_input(
            BenchmarkId::new("block", block_size),
            &block,
            |b, block| {
                b.iter(|| filter.select(black_box(block)));
            },
        );
    }

    group.finish();
}

struct NullSink;

impl eth_tx_observer::blockchain::EventSink for NullSink {
    fn emit(&self, _event: &eth_tx_observer::models::ObserverEvent) {}
}

criterion_group!(
    name = benches;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(10))
        .sample_size(100);
    targets = bench_store_record, bench_store_query, bench_filter_select
);
criterion_main!(benches);
