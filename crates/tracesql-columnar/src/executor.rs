//! The column filter engine.
//!
//! Constraints are applied left to right; each constraint narrows the row set
//! produced by the previous one. Per constraint the engine picks a strategy
//! from the column's shape alone: the bounds strategy binary-narrows a
//! contiguous range over sorted, overlay-free storage; the indexed strategy
//! evaluates the predicate row by row through the overlay stack. On
//! overlay-free columns the two must agree exactly.

use std::cmp::Ordering;

use tracing::trace;
use tracesql_core::{Error, Result, SqlValue};

use crate::overlay::OverlayStack;
use crate::row_set::RowSet;
use crate::storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    IsNull,
    IsNotNull,
}

/// One predicate over one column.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub column: usize,
    pub op: FilterOp,
    pub value: SqlValue,
}

/// Storage plus the overlay stack that maps logical query rows onto it.
pub struct Column {
    name: String,
    storage: Storage,
    overlays: OverlayStack,
}

impl Column {
    pub fn new(name: impl Into<String>, storage: Storage) -> Self {
        Self {
            name: name.into(),
            storage,
            overlays: OverlayStack::new(),
        }
    }

    pub fn with_overlays(name: impl Into<String>, storage: Storage, overlays: OverlayStack) -> Self {
        Self {
            name: name.into(),
            storage,
            overlays,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn overlays(&self) -> &OverlayStack {
        &self.overlays
    }

    /// Logical rows this column exposes: the outermost overlay's length, or
    /// the raw storage length when no overlays are present.
    pub fn row_count(&self) -> u32 {
        self.overlays.row_count().unwrap_or_else(|| self.storage.len())
    }

    /// The cell value at a logical row, with nulls resolved through the
    /// overlay stack.
    pub fn value(&self, row: u32) -> SqlValue {
        if self.overlays.is_null(row) {
            return SqlValue::Null;
        }
        self.storage.get(self.overlays.resolve(row))
    }
}

/// Evaluates constraint lists over a set of columns sharing a row count.
pub struct QueryExecutor<'a> {
    columns: &'a [Column],
    row_count: u32,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(columns: &'a [Column], row_count: u32) -> Self {
        Self { columns, row_count }
    }

    /// AND-combine `constraints` by successive narrowing, left to right. No
    /// reordering, no cost model.
    pub fn filter(&self, constraints: &[Constraint]) -> Result<RowSet> {
        let mut rows = RowSet::full(self.row_count);
        for constraint in constraints {
            let column = self.columns.get(constraint.column).ok_or_else(|| {
                Error::Structural(format!(
                    "constraint references column {} but only {} exist",
                    constraint.column,
                    self.columns.len()
                ))
            })?;
            rows = Self::apply(column, constraint, rows);
            trace!(
                column = column.name(),
                op = ?constraint.op,
                remaining = rows.len(),
                "filter step"
            );
            if rows.is_empty() {
                break;
            }
        }
        Ok(rows)
    }

    /// Apply one constraint to a candidate set, choosing the strategy from
    /// the column's shape.
    pub fn apply(column: &Column, constraint: &Constraint, candidates: RowSet) -> RowSet {
        if column.overlays().is_empty() && column.storage().is_sorted() {
            if let Some(range) = candidates.as_range() {
                if let Some(result) = Self::bounded_filter(column, constraint, range) {
                    return result;
                }
            }
        }
        Self::indexed_filter(column, constraint, &candidates)
    }

    /// Contiguous narrowing over sorted, overlay-free storage. Returns `None`
    /// when the operator cannot be expressed as a contiguous cut (e.g. `!=`),
    /// in which case the caller falls back to the indexed strategy.
    pub fn bounded_filter(
        column: &Column,
        constraint: &Constraint,
        range: std::ops::Range<u32>,
    ) -> Option<RowSet> {
        let storage = column.storage();
        match constraint.op {
            // Storage itself is never null.
            FilterOp::IsNull => Some(RowSet::empty()),
            FilterOp::IsNotNull => Some(RowSet::Range(range)),
            FilterOp::Ne => None,
            FilterOp::Eq | FilterOp::Lt | FilterOp::Le | FilterOp::Gt | FilterOp::Ge => {
                if constraint.value.is_null() {
                    return Some(RowSet::empty());
                }
                let bounds = storage
                    .lower_bound(&constraint.value)
                    .zip(storage.upper_bound(&constraint.value));
                let Some((lower, upper)) = bounds else {
                    // The literal is not comparable with this storage type,
                    // so nothing matches.
                    return Some(RowSet::empty());
                };
                let (start, end) = match constraint.op {
                    FilterOp::Eq => (lower, upper),
                    FilterOp::Lt => (range.start, lower),
                    FilterOp::Le => (range.start, upper),
                    FilterOp::Gt => (upper, range.end),
                    FilterOp::Ge => (lower, range.end),
                    _ => unreachable!(),
                };
                let start = start.max(range.start);
                let end = end.min(range.end);
                if start >= end {
                    Some(RowSet::empty())
                } else {
                    Some(RowSet::Range(start..end))
                }
            }
        }
    }

    /// Per-row evaluation through the overlay stack. Null testing walks
    /// outermost-first; index translation composes down to the storage slot.
    pub fn indexed_filter(column: &Column, constraint: &Constraint, candidates: &RowSet) -> RowSet {
        let mut passing = Vec::new();
        for row in candidates.iter() {
            let is_null = column.overlays().is_null(row);
            let pass = match constraint.op {
                FilterOp::IsNull => is_null,
                FilterOp::IsNotNull => !is_null,
                _ => {
                    if is_null {
                        false
                    } else {
                        let value = column.storage().get(column.overlays().resolve(row));
                        value_matches(&value, constraint.op, &constraint.value)
                    }
                }
            };
            if pass {
                passing.push(row);
            }
        }
        RowSet::Index(passing)
    }
}

/// Comparison semantics shared by both strategies: null literals match
/// nothing, integers and floats compare as f64, text compares with text, and
/// type mismatches match nothing.
fn value_matches(value: &SqlValue, op: FilterOp, literal: &SqlValue) -> bool {
    if literal.is_null() {
        return false;
    }
    let ord = match (value.as_f64(), literal.as_f64()) {
        (Some(a), Some(b)) => match a.partial_cmp(&b) {
            Some(ord) => ord,
            None => return false,
        },
        _ => match (value.as_str(), literal.as_str()) {
            (Some(a), Some(b)) => a.cmp(b),
            _ => return false,
        },
    };
    match op {
        FilterOp::Eq => ord == Ordering::Equal,
        FilterOp::Ne => ord != Ordering::Equal,
        FilterOp::Lt => ord == Ordering::Less,
        FilterOp::Le => ord != Ordering::Greater,
        FilterOp::Gt => ord == Ordering::Greater,
        FilterOp::Ge => ord != Ordering::Less,
        FilterOp::IsNull | FilterOp::IsNotNull => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_column(values: Vec<i64>) -> Column {
        Column::new("c", Storage::Int(values))
    }

    #[test]
    fn ge_on_sorted_storage_narrows_a_range() {
        let col = int_column(vec![1, 2, 3, 4, 5]);
        let cols = [col];
        let exec = QueryExecutor::new(&cols, 5);
        let rows = exec
            .filter(&[Constraint {
                column: 0,
                op: FilterOp::Ge,
                value: SqlValue::Integer(3),
            }])
            .unwrap();
        assert_eq!(rows.indices(), vec![2, 3, 4]);
        assert!(rows.as_range().is_some());
    }

    #[test]
    fn ne_falls_back_to_indexed() {
        let col = int_column(vec![1, 2, 3]);
        let rows = QueryExecutor::apply(
            &col,
            &Constraint {
                column: 0,
                op: FilterOp::Ne,
                value: SqlValue::Integer(2),
            },
            RowSet::full(3),
        );
        assert_eq!(rows.indices(), vec![0, 2]);
    }

    #[test]
    fn null_literal_matches_nothing() {
        let col = int_column(vec![1, 2, 3]);
        for op in [FilterOp::Eq, FilterOp::Ne, FilterOp::Lt, FilterOp::Ge] {
            let rows = QueryExecutor::apply(
                &col,
                &Constraint {
                    column: 0,
                    op,
                    value: SqlValue::Null,
                },
                RowSet::full(3),
            );
            assert!(rows.is_empty(), "{op:?} against NULL should be empty");
        }
    }

    #[test]
    fn type_mismatch_matches_nothing_in_both_strategies() {
        let col = int_column(vec![1, 2, 3]);
        let constraint = Constraint {
            column: 0,
            op: FilterOp::Eq,
            value: SqlValue::Text("x".into()),
        };
        let bounded = QueryExecutor::bounded_filter(&col, &constraint, 0..3).unwrap();
        let indexed = QueryExecutor::indexed_filter(&col, &constraint, &RowSet::full(3));
        assert!(bounded.is_empty());
        assert!(indexed.is_empty());
    }
}
