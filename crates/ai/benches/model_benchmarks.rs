use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::{Duration, TimeZone, Utc};
use supplysight_ai::{
    forecast_demand, optimize_price, score_supplier_risk, MovementKind, PerformanceRecord, PricedItem,
    PricingParameters, StockMovement, SupplierPerformancePredictor,
};
use supplysight_core::{ItemId, SupplierId};

fn history(supplier_id: SupplierId, len: usize) -> Vec<PerformanceRecord> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..len)
        .rev()
        .map(|i| PerformanceRecord {
            supplier_id,
            on_time_delivery_rate: 80.0 + (i % 20) as f64,
            quality_acceptance_rate: 85.0 + (i % 15) as f64,
            response_time_hours: 12.0 + (i % 36) as f64,
            overall_rating: 0.5 + (i % 5) as f64 / 10.0,
            evaluation_date: start + Duration::days(i as i64 * 7),
        })
        .collect()
}

fn movements(item_id: ItemId, days: usize) -> Vec<StockMovement> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
    (0..days * 3)
        .map(|i| StockMovement {
            item_id,
            kind: if i % 3 == 0 { MovementKind::Inbound } else { MovementKind::Outbound },
            quantity: 5.0 + (i % 11) as f64,
            unit_cost: Some(10.0 + (i % 4) as f64),
            timestamp: start + Duration::hours(i as i64 * 8),
        })
        .collect()
}

fn bench_supplier_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("supplier_scoring");
    let predictor = SupplierPerformancePredictor::default();
    let as_of = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

    for len in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::new("predict_and_score", len), len, |b, &len| {
            let supplier_id = SupplierId::new();
            let records = history(supplier_id, len);

            b.iter(|| {
                let prediction = predictor.predict(supplier_id, &records, records.first(), as_of);
                black_box(score_supplier_risk(supplier_id, &records, &prediction));
            });
        });
    }

    group.finish();
}

fn bench_demand_forecast(c: &mut Criterion) {
    let mut group = c.benchmark_group("demand_forecast");
    let as_of = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();

    for days in [14, 90, 180].iter() {
        group.bench_with_input(BenchmarkId::new("forecast", days), days, |b, &days| {
            let item_id = ItemId::new();
            let data = movements(item_id, days);

            b.iter(|| black_box(forecast_demand(item_id, &data, as_of)));
        });
    }

    group.finish();
}

fn bench_price_optimization(c: &mut Criterion) {
    let item = PricedItem {
        item_id: ItemId::new(),
        unit_price: 120.0,
        unit_cost: 100.0,
    };
    let competitors: Vec<f64> = (0..50).map(|i| 110.0 + i as f64).collect();

    c.bench_function("optimize_price_with_competitors", |b| {
        b.iter(|| black_box(optimize_price(&item, &competitors, PricingParameters::default())));
    });
}

criterion_group!(
    benches,
    bench_supplier_scoring,
    bench_demand_forecast,
    bench_price_optimization
);
criterion_main!(benches);
