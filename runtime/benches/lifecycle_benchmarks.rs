//! Lifecycle overhead benchmarks
//!
//! Measures the orchestration cost of the lifecycle manager on top of
//! in-memory ports: scope bookkeeping, JSON encoding for cache and bus,
//! and timeout wrapping of secondary steps.
//!
//! Run with: `cargo bench -p reporting-runtime`

#![allow(missing_docs)] // Benchmarks don't need extensive docs
#![allow(clippy::expect_used, clippy::unwrap_used)] // Benchmarks can use expect for setup

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use reporting_core::custom_report::CustomReportRequest;
use reporting_core::report::{NewReport, ReportPatch};
use reporting_runtime::ReportLifecycle;
use reporting_testing::{
    InMemoryCacheStore, InMemoryEventBus, InMemoryReportStore, StubSalesSource, test_clock,
};
use std::sync::Arc;

fn lifecycle() -> ReportLifecycle {
    ReportLifecycle::builder()
        .store(Arc::new(InMemoryReportStore::new()))
        .cache(Arc::new(InMemoryCacheStore::new()))
        .events(Arc::new(InMemoryEventBus::new()))
        .sales(Arc::new(StubSalesSource::default()))
        .clock(Arc::new(test_clock()))
        .build()
        .expect("all ports are set")
}

fn payload() -> NewReport {
    NewReport::new("sales")
        .with_name("Sales Q1 2024")
        .with_attribute("region", "North")
        .with_attribute("product", "Widget A")
}

fn benchmark_write_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_path");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("create", |b| {
        let lifecycle = lifecycle();
        b.to_async(&runtime).iter(|| async {
            let _ = lifecycle.create(black_box(payload())).await;
        });
    });

    group.bench_function("update", |b| {
        let lifecycle = lifecycle();
        let report = runtime.block_on(lifecycle.create(payload())).unwrap();
        b.to_async(&runtime).iter(|| async {
            let _ = lifecycle
                .update(&report.id, black_box(ReportPatch::default().with_status("completed")))
                .await;
        });
    });

    group.finish();
}

fn benchmark_read_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_path");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("get_cache_hit", |b| {
        let lifecycle = lifecycle();
        let report = runtime.block_on(lifecycle.create(payload())).unwrap();
        b.to_async(&runtime).iter(|| async {
            let _ = lifecycle.get(black_box(&report.id)).await;
        });
    });

    group.bench_function("generate_custom_report_100", |b| {
        let lifecycle = lifecycle();
        runtime.block_on(async {
            for _ in 0..100 {
                lifecycle.create(payload()).await.unwrap();
            }
        });
        b.to_async(&runtime).iter(|| async {
            let _ = lifecycle
                .generate_custom_report(black_box(CustomReportRequest::new("sales")))
                .await;
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_write_path, benchmark_read_path);
criterion_main!(benches);
