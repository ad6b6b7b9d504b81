//! Materialized in-memory tables and their virtual-table module.
//!
//! `CREATE TRACE TABLE name AS <query>` drains the query into a
//! `RuntimeTable` and registers an eponymous virtual-table module under the
//! table's name, so later statements query it like any other relation.
//! Supported WHERE constraints are pushed down into the column filter
//! engine; everything else SQLite evaluates itself.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rusqlite::ffi;
use rusqlite::types::{Value, ValueRef};
use rusqlite::vtab::{
    eponymous_only_module, Context, IndexConstraintOp, IndexInfo, VTab, VTabConnection,
    VTabCursor, Values,
};
use tracing::{debug, warn};
use tracesql_columnar::{Constraint, FilterOp, RuntimeTable, RuntimeTableBuilder};
use tracesql_core::{Error, Result, SqlSource, SqlValue};

use crate::pipeline::TraceSqlEngine;

impl TraceSqlEngine {
    /// Materialize `body` and register the result as a queryable relation
    /// under `name`.
    pub fn register_materialized_table(&self, name: &str, body: SqlSource) -> Result<()> {
        let mut stmt = match self.sqlite().prepare(body.sql()) {
            Ok(stmt) => stmt,
            Err(f) => {
                let offset = f.offset.unwrap_or(0);
                return Err(Error::from(f).with_traceback(body.as_traceback(offset)));
            }
        };

        let names: Vec<String> = (0..stmt.column_count()).map(|i| stmt.column_name(i)).collect();
        if names.iter().any(String::is_empty) {
            return Err(Error::Structural(format!(
                "table '{name}': column names must not be empty"
            )));
        }

        let mut builder = RuntimeTableBuilder::new(names);
        let mut rows = 0u32;
        while stmt.step()? {
            for i in 0..builder.column_count() {
                builder
                    .add_value(i, &stmt.column_value(i))
                    .map_err(|e| Error::Structural(format!("table '{name}': {e}")))?;
            }
            rows += 1;
        }
        let table = builder.finalize(rows)?;
        debug!(table = name, rows, "materialized table");

        self.sqlite()
            .connection()
            .create_module(name, eponymous_only_module::<RuntimeTableTab>(), Some(Rc::new(table)))
            .map_err(|e| Error::Engine(e.to_string()))?;

        // Best-effort listing of the new relation; a failure here must not
        // undo the registration.
        let insert = format!(
            "INSERT INTO {}(name) VALUES (?1)",
            self.config().bookkeeping_table
        );
        if let Err(e) = self
            .sqlite()
            .connection()
            .execute(&insert, rusqlite::params![name])
        {
            warn!(table = name, error = %e, "bookkeeping insert failed");
        }
        Ok(())
    }
}

pub(crate) fn sql_value_from_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(i) => SqlValue::Integer(i),
        ValueRef::Real(f) => SqlValue::Float(f),
        ValueRef::Text(t) => SqlValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => SqlValue::Blob(b.to_vec()),
    }
}

pub(crate) fn to_rusqlite_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(*i),
        SqlValue::Float(f) => Value::Real(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Blob(b) => Value::Blob(b.clone()),
    }
}

fn filter_op(op: IndexConstraintOp) -> Option<(FilterOp, bool)> {
    // Second element: whether the constraint carries a right-hand value.
    match op {
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ => Some((FilterOp::Eq, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_NE => Some((FilterOp::Ne, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LT => Some((FilterOp::Lt, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_LE => Some((FilterOp::Le, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GT => Some((FilterOp::Gt, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_GE => Some((FilterOp::Ge, true)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNULL => Some((FilterOp::IsNull, false)),
        IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_ISNOTNULL => Some((FilterOp::IsNotNull, false)),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlannedConstraint {
    column: usize,
    op: FilterOp,
    has_value: bool,
}

#[repr(C)]
pub(crate) struct RuntimeTableTab {
    /// Base class. Must be first.
    base: ffi::sqlite3_vtab,
    table: Rc<RuntimeTable>,
    plans: Rc<RefCell<HashMap<i32, Vec<PlannedConstraint>>>>,
    next_plan: Cell<i32>,
}

unsafe impl<'vtab> VTab<'vtab> for RuntimeTableTab {
    type Aux = Rc<RuntimeTable>;
    type Cursor = RuntimeTableCursor;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        _args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let table = aux
            .map(Rc::clone)
            .ok_or_else(|| rusqlite::Error::ModuleError("missing table data".into()))?;
        // Names are whatever the source query produced; an unaliased
        // expression like count(*) is only valid quoted.
        let cols: Vec<String> = table
            .column_names()
            .iter()
            .map(|n| format!("\"{}\"", n.replace('"', "\"\"")))
            .collect();
        let schema = format!("CREATE TABLE x({})", cols.join(", "));
        Ok((
            schema,
            RuntimeTableTab {
                base: ffi::sqlite3_vtab::default(),
                table,
                plans: Rc::new(RefCell::new(HashMap::new())),
                next_plan: Cell::new(0),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let mut claimed = Vec::new();
        for (i, constraint) in info.constraints().enumerate() {
            if !constraint.is_usable() {
                continue;
            }
            let Some((op, has_value)) = filter_op(constraint.operator()) else {
                continue;
            };
            let column = constraint.column() as usize;
            if column >= self.table.column_count() {
                continue;
            }
            claimed.push((
                i,
                PlannedConstraint {
                    column,
                    op,
                    has_value,
                },
            ));
        }

        let mut plan = Vec::with_capacity(claimed.len());
        let mut argv = 0;
        for (i, planned) in claimed {
            let mut usage = info.constraint_usage(i);
            if planned.has_value {
                argv += 1;
                usage.set_argv_index(argv);
            }
            usage.set_omit(true);
            plan.push(planned);
        }

        let cost = self.table.row_count() as f64 / (plan.len() + 1) as f64;
        // Identical plans share an idx_num, so repeated prepares of similar
        // queries do not grow the map.
        let mut plans = self.plans.borrow_mut();
        let existing = plans
            .iter()
            .find(|(_, p)| **p == plan)
            .map(|(&id, _)| id);
        let plan_id = existing.unwrap_or_else(|| {
            let id = self.next_plan.get() + 1;
            self.next_plan.set(id);
            plans.insert(id, plan);
            id
        });
        info.set_idx_num(plan_id);
        info.set_estimated_cost(cost.max(1.0));
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<RuntimeTableCursor> {
        Ok(RuntimeTableCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            table: Rc::clone(&self.table),
            plans: Rc::clone(&self.plans),
            rows: Vec::new(),
            pos: 0,
        })
    }
}

#[repr(C)]
pub(crate) struct RuntimeTableCursor {
    /// Base class. Must be first.
    base: ffi::sqlite3_vtab_cursor,
    table: Rc<RuntimeTable>,
    plans: Rc<RefCell<HashMap<i32, Vec<PlannedConstraint>>>>,
    rows: Vec<u32>,
    pos: usize,
}

unsafe impl VTabCursor for RuntimeTableCursor {
    fn filter(
        &mut self,
        idx_num: std::ffi::c_int,
        _idx_str: Option<&str>,
        args: &Values<'_>,
    ) -> rusqlite::Result<()> {
        let plan = self
            .plans
            .borrow()
            .get(&idx_num)
            .cloned()
            .unwrap_or_default();

        let mut values = args.iter().map(sql_value_from_ref);
        let constraints: Vec<Constraint> = plan
            .into_iter()
            .map(|p| Constraint {
                column: p.column,
                op: p.op,
                value: if p.has_value {
                    values.next().unwrap_or(SqlValue::Null)
                } else {
                    SqlValue::Null
                },
            })
            .collect();

        let rows = self
            .table
            .filter(&constraints)
            .map_err(|e| rusqlite::Error::ModuleError(e.to_string()))?;
        self.rows = rows.indices();
        self.pos = 0;
        Ok(())
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn column(&self, ctx: &mut Context, i: std::ffi::c_int) -> rusqlite::Result<()> {
        let value = self.table.cell(i as usize, self.rows[self.pos]);
        ctx.set_result(&to_rusqlite_value(&value))
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.rows[self.pos] as i64)
    }
}
