use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::runtime::Runtime;

use stockledger_core::{LogEntryId, ProductId, UserId};
use stockledger_infra::config::LedgerConfig;
use stockledger_infra::{InMemoryStockStore, StockLedger, StockQueries};
use stockledger_inventory::{
    replay_stock, ActorRef, InventoryLogEntry, MovementRequest, NewProduct, Product, StockAction,
};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

fn seed(
    rt: &Runtime,
    ledger: &StockLedger<InMemoryStockStore>,
    actor: &ActorRef,
    count: usize,
) -> Vec<Product> {
    rt.block_on(async {
        let mut products = Vec::with_capacity(count);
        for i in 0..count {
            let product = ledger
                .create_product(
                    NewProduct {
                        sku: format!("SKU-{i:05}"),
                        name: format!("Product {i}"),
                        category: format!("Category {}", i % 8),
                        stock: Some((i % 40) as i64),
                        price: Some(Decimal::new(199 + i as i64, 2)),
                        ..Default::default()
                    },
                    actor,
                )
                .await
                .unwrap();
            products.push(product);
        }
        products
    })
}

fn bench_apply_movement(c: &mut Criterion) {
    let mut group = c.benchmark_group("apply_movement");
    let rt = runtime();
    let ledger = StockLedger::with_timeout(InMemoryStockStore::new(), Duration::from_secs(5));
    let actor = ActorRef::new(UserId::new(), "bench");
    let products = seed(&rt, &ledger, &actor, 1);
    let product_id = products[0].id;

    // Add then Remove keeps the stock level flat across iterations.
    group.bench_function("add_then_remove", |b| {
        b.iter(|| {
            rt.block_on(async {
                for action in [StockAction::Add, StockAction::Remove] {
                    let req = MovementRequest::new(product_id, action, black_box(5), None).unwrap();
                    ledger.apply_movement(req, &actor).await.unwrap();
                }
            })
        });
    });

    group.bench_function("rejected_remove", |b| {
        b.iter(|| {
            rt.block_on(async {
                let req =
                    MovementRequest::new(product_id, StockAction::Remove, black_box(1_000_000), None)
                        .unwrap();
                let _ = ledger.apply_movement(req, &actor).await;
            })
        });
    });

    group.finish();
}

fn synthetic_ledger(len: usize) -> Vec<InventoryLogEntry> {
    let t0 = Utc::now();
    let product_id = ProductId::new();
    let actor_id = UserId::new();
    let mut stock = 0u32;
    (0..len)
        .map(|i| {
            let (action, quantity) = match i % 3 {
                0 => (StockAction::Add, 10),
                1 => (StockAction::Remove, 3),
                _ => (StockAction::Update, stock + 1),
            };
            let previous = stock;
            stock = action.apply(previous, quantity).unwrap();
            InventoryLogEntry {
                id: LogEntryId::new(),
                product_id,
                actor_id,
                action,
                quantity,
                previous_stock: previous,
                new_stock: stock,
                notes: None,
                created_at: t0 + ChronoDuration::milliseconds(i as i64),
            }
        })
        .collect()
}

fn bench_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_replay");
    for len in [100usize, 1_000, 10_000] {
        let ledger = synthetic_ledger(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &ledger, |b, ledger| {
            b.iter(|| replay_stock(black_box(ledger)).unwrap());
        });
    }
    group.finish();
}

fn bench_compute_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("compute_stats");
    let rt = runtime();
    let actor = ActorRef::new(UserId::new(), "bench");

    for count in [100usize, 1_000] {
        let store = InMemoryStockStore::new();
        let ledger = StockLedger::with_timeout(store.clone(), Duration::from_secs(5));
        seed(&rt, &ledger, &actor, count);
        let queries = StockQueries::new(store, &LedgerConfig::default());

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &queries, |b, queries| {
            b.iter(|| rt.block_on(queries.compute_stats()).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply_movement, bench_replay, bench_compute_stats);
criterion_main!(benches);
