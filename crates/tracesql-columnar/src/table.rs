//! Materialized in-memory tables.
//!
//! `RuntimeTableBuilder` accepts dynamically-typed cells column by column
//! while a query is drained; each column settles on a type at its first
//! non-null cell (nulls before that are counted and back-filled). `finalize`
//! freezes the data into immutable columns: dense typed storage plus a
//! `NullOverlay` for columns that contained nulls.

use tracesql_core::{Error, Result, SqlValue};

use crate::executor::{Column, Constraint, QueryExecutor};
use crate::overlay::{NullOverlay, OverlayStack};
use crate::row_set::RowSet;
use crate::storage::Storage;

enum ColumnData {
    /// No non-null cell seen yet; only a count of leading nulls.
    LeadingNulls(u32),
    Int { values: Vec<i64>, present: Vec<bool> },
    Float { values: Vec<f64>, present: Vec<bool> },
    Text { values: Vec<String>, present: Vec<bool> },
}

impl ColumnData {
    fn logical_len(&self) -> u32 {
        match self {
            ColumnData::LeadingNulls(n) => *n,
            ColumnData::Int { present, .. }
            | ColumnData::Float { present, .. }
            | ColumnData::Text { present, .. } => present.len() as u32,
        }
    }
}

/// Append-only accumulator for one table's worth of query output.
pub struct RuntimeTableBuilder {
    names: Vec<String>,
    data: Vec<ColumnData>,
}

impl RuntimeTableBuilder {
    pub fn new(names: Vec<String>) -> Self {
        let data = names.iter().map(|_| ColumnData::LeadingNulls(0)).collect();
        Self { names, data }
    }

    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    /// Append one cell to column `idx`. Blob cells are unsupported; a cell
    /// whose type disagrees with the column's settled type is an error.
    pub fn add_value(&mut self, idx: usize, value: &SqlValue) -> Result<()> {
        match value {
            SqlValue::Null => self.add_null(idx),
            SqlValue::Integer(v) => self.add_integer(idx, *v),
            SqlValue::Float(v) => self.add_float(idx, *v),
            SqlValue::Text(v) => self.add_text(idx, v),
            SqlValue::Blob(_) => Err(Error::Structural(format!(
                "column '{}': blob columns are not supported",
                self.names[idx]
            ))),
        }
    }

    pub fn add_null(&mut self, idx: usize) -> Result<()> {
        match &mut self.data[idx] {
            ColumnData::LeadingNulls(n) => *n += 1,
            ColumnData::Int { present, .. }
            | ColumnData::Float { present, .. }
            | ColumnData::Text { present, .. } => present.push(false),
        }
        Ok(())
    }

    pub fn add_integer(&mut self, idx: usize, value: i64) -> Result<()> {
        let col = &mut self.data[idx];
        if let ColumnData::LeadingNulls(n) = col {
            *col = ColumnData::Int {
                values: Vec::new(),
                present: vec![false; *n as usize],
            };
        }
        match col {
            ColumnData::Int { values, present } => {
                values.push(value);
                present.push(true);
                Ok(())
            }
            _ => Err(self.inconsistent(idx)),
        }
    }

    pub fn add_float(&mut self, idx: usize, value: f64) -> Result<()> {
        let col = &mut self.data[idx];
        if let ColumnData::LeadingNulls(n) = col {
            *col = ColumnData::Float {
                values: Vec::new(),
                present: vec![false; *n as usize],
            };
        }
        match col {
            ColumnData::Float { values, present } => {
                values.push(value);
                present.push(true);
                Ok(())
            }
            _ => Err(self.inconsistent(idx)),
        }
    }

    pub fn add_text(&mut self, idx: usize, value: &str) -> Result<()> {
        let col = &mut self.data[idx];
        if let ColumnData::LeadingNulls(n) = col {
            *col = ColumnData::Text {
                values: Vec::new(),
                present: vec![false; *n as usize],
            };
        }
        match col {
            ColumnData::Text { values, present } => {
                values.push(value.to_string());
                present.push(true);
                Ok(())
            }
            _ => Err(self.inconsistent(idx)),
        }
    }

    fn inconsistent(&self, idx: usize) -> Error {
        Error::Structural(format!(
            "column '{}' does not have consistent types",
            self.names[idx]
        ))
    }

    /// Freeze into an immutable table with exactly `rows` rows. Columns that
    /// never saw a value become all-null integer columns.
    pub fn finalize(self, rows: u32) -> Result<RuntimeTable> {
        let mut columns = Vec::with_capacity(self.names.len());
        for (name, col) in self.names.iter().zip(self.data) {
            if col.logical_len() != rows {
                return Err(Error::Structural(format!(
                    "column '{}' has {} values but the table has {} rows",
                    name,
                    col.logical_len(),
                    rows
                )));
            }
            let col = match col {
                ColumnData::LeadingNulls(n) => ColumnData::Int {
                    values: Vec::new(),
                    present: vec![false; n as usize],
                },
                other => other,
            };
            let (storage, present) = match col {
                ColumnData::Int { values, present } => (Storage::Int(values), present),
                ColumnData::Float { values, present } => (Storage::Float(values), present),
                ColumnData::Text { values, present } => (Storage::Text(values), present),
                ColumnData::LeadingNulls(_) => unreachable!(),
            };
            let column = if present.iter().all(|&p| p) {
                Column::new(name.clone(), storage)
            } else {
                let mut overlays = OverlayStack::new();
                overlays.push(Box::new(NullOverlay::new(present)))?;
                Column::with_overlays(name.clone(), storage, overlays)
            };
            columns.push(column);
        }
        Ok(RuntimeTable {
            names: self.names,
            columns,
            row_count: rows,
        })
    }
}

/// A finalized materialized table: fixed row and column count, immutable.
pub struct RuntimeTable {
    names: Vec<String>,
    columns: Vec<Column>,
    row_count: u32,
}

impl RuntimeTable {
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }

    /// The cell at (column, logical row), nulls included.
    pub fn cell(&self, col: usize, row: u32) -> SqlValue {
        self.columns[col].value(row)
    }

    /// Run the filter engine over this table's columns.
    pub fn filter(&self, constraints: &[Constraint]) -> Result<RowSet> {
        QueryExecutor::new(&self.columns, self.row_count).filter(constraints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_rows_with_nulls() {
        let mut builder = RuntimeTableBuilder::new(vec!["id".into(), "name".into()]);
        builder.add_integer(0, 1).unwrap();
        builder.add_text(1, "a").unwrap();
        builder.add_integer(0, 2).unwrap();
        builder.add_null(1).unwrap();
        let table = builder.finalize(2).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.cell(0, 0), SqlValue::Integer(1));
        assert_eq!(table.cell(1, 0), SqlValue::Text("a".into()));
        assert_eq!(table.cell(0, 1), SqlValue::Integer(2));
        assert_eq!(table.cell(1, 1), SqlValue::Null);
    }

    #[test]
    fn leading_nulls_are_backfilled() {
        let mut builder = RuntimeTableBuilder::new(vec!["v".into()]);
        builder.add_null(0).unwrap();
        builder.add_null(0).unwrap();
        builder.add_float(0, 1.5).unwrap();
        let table = builder.finalize(3).unwrap();

        assert_eq!(table.cell(0, 0), SqlValue::Null);
        assert_eq!(table.cell(0, 1), SqlValue::Null);
        assert_eq!(table.cell(0, 2), SqlValue::Float(1.5));
    }

    #[test]
    fn inconsistent_types_are_rejected() {
        let mut builder = RuntimeTableBuilder::new(vec!["v".into()]);
        builder.add_integer(0, 1).unwrap();
        let err = builder.add_text(0, "x").unwrap_err();
        assert!(err.to_string().contains("consistent types"));
    }

    #[test]
    fn blob_cells_are_rejected() {
        let mut builder = RuntimeTableBuilder::new(vec!["v".into()]);
        let err = builder.add_value(0, &SqlValue::Blob(vec![1, 2])).unwrap_err();
        assert!(err.to_string().contains("blob columns are not supported"));
    }
}
