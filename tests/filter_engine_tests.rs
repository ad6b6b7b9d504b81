//! Filter-engine behavior over storage, overlays, and both strategies.

use tracesql_columnar::{
    Column, Constraint, FilterOp, NullOverlay, OverlayStack, QueryExecutor, RowSet,
    SelectorOverlay, Storage,
};
use tracesql_core::SqlValue;

fn constraint(column: usize, op: FilterOp, value: SqlValue) -> Constraint {
    Constraint { column, op, value }
}

#[test]
fn ge_on_sorted_ints_selects_the_tail() {
    let cols = [Column::new("ts", Storage::Int(vec![1, 2, 3, 4, 5]))];
    let exec = QueryExecutor::new(&cols, 5);
    let rows = exec
        .filter(&[constraint(0, FilterOp::Ge, SqlValue::Integer(3))])
        .unwrap();
    assert_eq!(rows.indices(), vec![2, 3, 4]);
}

#[test]
fn is_null_returns_exactly_the_masked_rows() {
    let null_positions = [2u32, 5, 6, 7, 9];
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(NullOverlay::from_null_positions(10, &null_positions)))
        .unwrap();
    // Five non-null rows back the ten logical rows.
    let cols = [Column::with_overlays(
        "dur",
        Storage::Int(vec![10, 20, 30, 40, 50]),
        overlays,
    )];
    let exec = QueryExecutor::new(&cols, 10);

    let nulls = exec
        .filter(&[constraint(0, FilterOp::IsNull, SqlValue::Null)])
        .unwrap();
    assert_eq!(nulls.indices(), null_positions.to_vec());

    let not_nulls = exec
        .filter(&[constraint(0, FilterOp::IsNotNull, SqlValue::Null)])
        .unwrap();
    assert_eq!(not_nulls.indices(), vec![0, 1, 3, 4, 8]);
}

#[test]
fn null_rows_fail_every_comparison() {
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(NullOverlay::from_null_positions(4, &[1, 3])))
        .unwrap();
    let cols = [Column::with_overlays(
        "v",
        Storage::Int(vec![7, 7]),
        overlays,
    )];
    let exec = QueryExecutor::new(&cols, 4);
    let rows = exec
        .filter(&[constraint(0, FilterOp::Eq, SqlValue::Integer(7))])
        .unwrap();
    assert_eq!(rows.indices(), vec![0, 2]);
}

#[test]
fn constraints_on_independent_columns_commute() {
    let cols = [
        Column::new("a", Storage::Int(vec![1, 1, 2, 2, 3, 3])),
        Column::new("b", Storage::Int(vec![9, 1, 9, 1, 9, 1])),
    ];
    let exec = QueryExecutor::new(&cols, 6);
    let forward = [
        constraint(0, FilterOp::Ge, SqlValue::Integer(2)),
        constraint(1, FilterOp::Eq, SqlValue::Integer(9)),
    ];
    let reversed = [forward[1].clone(), forward[0].clone()];
    assert_eq!(
        exec.filter(&forward).unwrap().indices(),
        exec.filter(&reversed).unwrap().indices()
    );
}

#[test]
fn strategies_agree_on_overlay_free_sorted_columns() {
    let values = vec![1i64, 3, 3, 5, 8, 8, 8, 13];
    let n = values.len() as u32;
    let plain = Column::new("c", Storage::Int(values.clone()));

    // An identity selector forces the indexed strategy over the same data.
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(SelectorOverlay::new((0..n).collect())))
        .unwrap();
    let selected = Column::with_overlays("c", Storage::Int(values), overlays);

    let ops = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Le,
        FilterOp::Gt,
        FilterOp::Ge,
        FilterOp::IsNull,
        FilterOp::IsNotNull,
    ];
    for op in ops {
        for literal in [SqlValue::Integer(3), SqlValue::Integer(8), SqlValue::Float(4.5)] {
            let c = constraint(0, op, literal.clone());
            let via_bounds = QueryExecutor::apply(&plain, &c, RowSet::full(n));
            let via_indexed = QueryExecutor::apply(&selected, &c, RowSet::full(n));
            assert_eq!(
                via_bounds.indices(),
                via_indexed.indices(),
                "{op:?} {literal:?}"
            );
        }
    }
}

#[test]
fn stacked_selector_and_null_overlays_compose() {
    // Inner null layer widens 3 storage values to 5 logical rows (nulls at
    // 1 and 3); the outer selector reorders a subset of those rows.
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(SelectorOverlay::new(vec![4, 1, 0, 2])))
        .unwrap();
    overlays
        .push(Box::new(NullOverlay::new(vec![
            true, false, true, false, true,
        ])))
        .unwrap();
    let cols = [Column::with_overlays(
        "c",
        Storage::Int(vec![10, 20, 30]),
        overlays,
    )];
    let exec = QueryExecutor::new(&cols, 4);

    // Outer rows map to null-layer rows 4, 1, 0, 2: values 30, null, 10, 20.
    let nulls = exec
        .filter(&[constraint(0, FilterOp::IsNull, SqlValue::Null)])
        .unwrap();
    assert_eq!(nulls.indices(), vec![1]);

    let rows = exec
        .filter(&[constraint(0, FilterOp::Ge, SqlValue::Integer(20))])
        .unwrap();
    assert_eq!(rows.indices(), vec![0, 3]);

    assert_eq!(cols[0].value(0), SqlValue::Integer(30));
    assert_eq!(cols[0].value(1), SqlValue::Null);
}

#[test]
fn selector_overlay_remaps_rows() {
    let mut overlays = OverlayStack::new();
    overlays
        .push(Box::new(SelectorOverlay::new(vec![4, 2, 0])))
        .unwrap();
    let col = Column::with_overlays("c", Storage::Int(vec![10, 11, 12, 13, 14]), overlays);
    assert_eq!(col.row_count(), 3);
    assert_eq!(col.value(0), SqlValue::Integer(14));
    assert_eq!(col.value(2), SqlValue::Integer(10));
}

#[test]
fn int_and_float_literals_compare_numerically() {
    let cols = [Column::new("c", Storage::Int(vec![1, 2, 3, 4]))];
    let exec = QueryExecutor::new(&cols, 4);
    let rows = exec
        .filter(&[constraint(0, FilterOp::Gt, SqlValue::Float(2.5))])
        .unwrap();
    assert_eq!(rows.indices(), vec![2, 3]);
}

#[test]
fn unknown_column_index_is_an_error() {
    let cols = [Column::new("c", Storage::Int(vec![1]))];
    let exec = QueryExecutor::new(&cols, 1);
    assert!(exec
        .filter(&[constraint(5, FilterOp::Eq, SqlValue::Integer(1))])
        .is_err());
}

#[test]
fn empty_result_short_circuits_later_constraints() {
    let cols = [
        Column::new("a", Storage::Int(vec![1, 2, 3])),
        Column::new("b", Storage::Int(vec![1, 2, 3])),
    ];
    let exec = QueryExecutor::new(&cols, 3);
    let rows = exec
        .filter(&[
            constraint(0, FilterOp::Gt, SqlValue::Integer(99)),
            constraint(1, FilterOp::Eq, SqlValue::Integer(1)),
        ])
        .unwrap();
    assert!(rows.is_empty());
}
