use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use stockledger_core::{OrderId, PartId, Quantity};
use stockledger_purchasing::{NewPurchaseOrder, PurchaseOrder, allocate};

fn open_orders(part_id: PartId, count: usize) -> Vec<PurchaseOrder> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    // Newest first so every run pays for the sort.
    (0..count)
        .rev()
        .map(|i| {
            PurchaseOrder::place(
                OrderId::new(),
                NewPurchaseOrder::new(part_id, Quantity::from_units(10), start + Duration::hours(i as i64)),
            )
            .unwrap()
        })
        .collect()
}

fn bench_allocate(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocate");

    for count in [1usize, 10, 100, 1_000] {
        let part_id = PartId::new();
        let orders = open_orders(part_id, count);
        // Enough to fill half the orders.
        let available = Quantity::from_units((count as u32 * 10) / 2);

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &orders, |b, orders| {
            b.iter_batched(
                || orders.clone(),
                |mut orders| {
                    black_box(allocate(&mut orders, part_id, available, Utc::now()));
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocate);
criterion_main!(benches);
