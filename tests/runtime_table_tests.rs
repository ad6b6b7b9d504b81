//! Building and querying materialized runtime tables.

use tracesql_columnar::{Constraint, FilterOp, RuntimeTableBuilder};
use tracesql_core::SqlValue;

#[test]
fn builds_and_reads_back_mixed_rows() {
    let mut builder = RuntimeTableBuilder::new(vec!["id".into(), "label".into()]);
    builder.add_value(0, &SqlValue::Integer(1)).unwrap();
    builder.add_value(1, &SqlValue::Text("a".into())).unwrap();
    builder.add_value(0, &SqlValue::Integer(2)).unwrap();
    builder.add_value(1, &SqlValue::Null).unwrap();
    let table = builder.finalize(2).unwrap();

    assert_eq!(table.column_names(), ["id", "label"]);
    assert_eq!(table.cell(0, 0), SqlValue::Integer(1));
    assert_eq!(table.cell(1, 0), SqlValue::Text("a".into()));
    assert_eq!(table.cell(1, 1), SqlValue::Null);
}

#[test]
fn all_null_column_stays_null_at_any_width() {
    let mut builder = RuntimeTableBuilder::new(vec!["v".into()]);
    for _ in 0..4 {
        builder.add_null(0).unwrap();
    }
    let table = builder.finalize(4).unwrap();
    for row in 0..4 {
        assert_eq!(table.cell(0, row), SqlValue::Null);
    }
}

#[test]
fn filter_sees_through_null_overlays() {
    let mut builder = RuntimeTableBuilder::new(vec!["dur".into()]);
    for v in [
        SqlValue::Integer(10),
        SqlValue::Null,
        SqlValue::Integer(30),
        SqlValue::Null,
        SqlValue::Integer(50),
    ] {
        builder.add_value(0, &v).unwrap();
    }
    let table = builder.finalize(5).unwrap();

    let rows = table
        .filter(&[Constraint {
            column: 0,
            op: FilterOp::Ge,
            value: SqlValue::Integer(30),
        }])
        .unwrap();
    assert_eq!(rows.indices(), vec![2, 4]);

    let nulls = table
        .filter(&[Constraint {
            column: 0,
            op: FilterOp::IsNull,
            value: SqlValue::Null,
        }])
        .unwrap();
    assert_eq!(nulls.indices(), vec![1, 3]);
}

#[test]
fn row_count_mismatch_is_rejected() {
    let mut builder = RuntimeTableBuilder::new(vec!["v".into()]);
    builder.add_integer(0, 1).unwrap();
    assert!(builder.finalize(2).is_err());
}
