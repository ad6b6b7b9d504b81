use criterion::{criterion_group, criterion_main, Criterion};
use tracesql_columnar::{Column, Constraint, FilterOp, NullOverlay, OverlayStack, QueryExecutor, Storage};
use tracesql_core::SqlValue;

fn make_columns(rows: u32) -> Vec<Column> {
    let ts: Vec<i64> = (0..rows as i64).collect();
    let dur: Vec<i64> = (0..rows as i64).map(|i| (i * 37) % 1000).collect();

    // Every 8th row of the third column is null.
    let null_positions: Vec<u32> = (0..rows).filter(|i| i % 8 == 0).collect();
    let present = rows - null_positions.len() as u32;
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(NullOverlay::from_null_positions(rows, &null_positions)))
        .unwrap();
    let depth: Vec<i64> = (0..present as i64).map(|i| i % 16).collect();

    vec![
        Column::new("ts", Storage::Int(ts)),
        Column::new("dur", Storage::Int(dur)),
        Column::with_overlays("depth", Storage::Int(depth), overlays),
    ]
}

fn bench_bounds_filter(c: &mut Criterion) {
    let columns = make_columns(65536);
    let exec = QueryExecutor::new(&columns, 65536);
    let constraints = [Constraint {
        column: 0,
        op: FilterOp::Ge,
        value: SqlValue::Integer(32768),
    }];
    c.bench_function("bounds_filter", |b| {
        b.iter(|| exec.filter(&constraints).unwrap())
    });
}

fn bench_indexed_filter(c: &mut Criterion) {
    let columns = make_columns(65536);
    let exec = QueryExecutor::new(&columns, 65536);
    let constraints = [Constraint {
        column: 1,
        op: FilterOp::Lt,
        value: SqlValue::Integer(500),
    }];
    c.bench_function("indexed_filter", |b| {
        b.iter(|| exec.filter(&constraints).unwrap())
    });
}

fn bench_narrowing_chain(c: &mut Criterion) {
    let columns = make_columns(65536);
    let exec = QueryExecutor::new(&columns, 65536);
    let constraints = [
        Constraint {
            column: 0,
            op: FilterOp::Ge,
            value: SqlValue::Integer(16384),
        },
        Constraint {
            column: 1,
            op: FilterOp::Lt,
            value: SqlValue::Integer(500),
        },
        Constraint {
            column: 2,
            op: FilterOp::IsNotNull,
            value: SqlValue::Null,
        },
    ];
    c.bench_function("narrowing_chain", |b| {
        b.iter(|| exec.filter(&constraints).unwrap())
    });
}

criterion_group!(filters, bench_bounds_filter, bench_indexed_filter, bench_narrowing_chain);
criterion_main!(filters);
