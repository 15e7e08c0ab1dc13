//! Performance benchmarks for tabsync-engine

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tabsync_engine::{
    tabular::{format_row, parse_row, ColumnMap},
    Baseline, DeletionPolicy, Reconciler, Record, Side, SideBaseline, Snapshot, Timestamp,
};

fn at(seconds: i64) -> Timestamp {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn record(id: i64, status: &str, seconds: i64) -> Record {
    Record::new(id, format!("First {id}"), "Last", status, "EMEA", "Rep").updated_at(at(seconds))
}

/// Two stores sharing most ids, with a slice of edits, inserts and deletes
/// on each side.
fn diverged_pair(size: i64) -> (Snapshot, Snapshot, Baseline) {
    let a = (1..=size).filter(|id| id % 10 != 0).map(|id| {
        if id % 7 == 0 {
            record(id, "won", 20)
        } else {
            record(id, "open", 10)
        }
    });
    let b = (1..=size + size / 10).filter(|id| id % 13 != 0).map(|id| {
        if id % 5 == 0 {
            record(id, "lost", 30)
        } else {
            record(id, "open", 10)
        }
    });

    let a = Snapshot::from_records(Side::A, a, at(60)).unwrap();
    let b = Snapshot::from_records(Side::B, b, at(60)).unwrap();
    let baseline = Baseline::from_sides(
        SideBaseline::new(1..=size, 5),
        SideBaseline::new(1..=size, 5),
    );
    (a, b, baseline)
}

fn bench_reconciliation(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciliation");

    for size in [100, 1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("reconcile", size), size, |b, &size| {
            let (a_snap, b_snap, baseline) = diverged_pair(size);
            let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

            b.iter(|| reconciler.reconcile(black_box(&a_snap), black_box(&b_snap)))
        });

        group.bench_with_input(BenchmarkId::new("converged", size), size, |b, &size| {
            let records: Vec<_> = (1..=size).map(|id| record(id, "open", 10)).collect();
            let a_snap = Snapshot::from_records(Side::A, records.clone(), at(60)).unwrap();
            let b_snap = Snapshot::from_records(Side::B, records, at(60)).unwrap();
            let baseline = Baseline::from_sides(
                SideBaseline::new(1..=size, 5),
                SideBaseline::new(1..=size, 5),
            );
            let reconciler = Reconciler::new(&baseline, DeletionPolicy::default());

            b.iter(|| reconciler.reconcile(black_box(&a_snap), black_box(&b_snap)))
        });
    }

    group.finish();
}

fn bench_baseline(c: &mut Criterion) {
    let mut group = c.benchmark_group("baseline");

    for size in [1_000, 10_000].iter() {
        group.bench_with_input(BenchmarkId::new("advance", size), size, |b, &size| {
            let (a_snap, b_snap, baseline) = diverged_pair(size);
            let result = Reconciler::new(&baseline, DeletionPolicy::default())
                .reconcile(&a_snap, &b_snap)
                .unwrap();

            b.iter(|| {
                let mut next = baseline.clone();
                next.advance(&a_snap, &b_snap, result.changes.iter().map(|c| (c, true)));
                next
            })
        });
    }

    group.finish();
}

fn bench_tabular(c: &mut Criterion) {
    let mut group = c.benchmark_group("tabular");
    let map = ColumnMap::canonical();
    let row = format_row(&map, &record(42, "open", 10).with_notes("call back"));

    group.bench_function("parse_row", |b| {
        b.iter(|| parse_row(black_box(&map), black_box(&row), 2))
    });

    group.bench_function("format_row", |b| {
        let record = record(42, "open", 10);
        b.iter(|| format_row(black_box(&map), black_box(&record)))
    });

    group.finish();
}

criterion_group!(benches, bench_reconciliation, bench_baseline, bench_tabular);
criterion_main!(benches);
