//! User-defined table functions.
//!
//! A `CREATE TRACE FUNCTION ... RETURNS TABLE(...)` statement registers
//! per-instance state here, then hands SQLite a synthetic
//! `CREATE VIRTUAL TABLE` statement against the `trace_table_function`
//! module. The registry and SQLite's relation lifecycle must stay in
//! lockstep: `state` and `unregister` panic on a missing entry, because that
//! means the engine dropped a relation we never knew about (or vice versa),
//! which is a defect rather than bad input.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use rusqlite::ffi;
use rusqlite::vtab::{
    read_only_module, Context, CreateVTab, IndexConstraintOp, IndexInfo, VTab, VTabConnection,
    VTabCursor, VTabKind, Values,
};
use tracesql_core::{SqlSource, SqlValue};
use tracesql_sqlite::{PreparedStatement, SqliteEngine};

use crate::prototype::{ArgumentDefinition, Prototype};
use crate::tables::{sql_value_from_ref, to_rusqlite_value};

/// The name the synthetic create statement uses.
pub const MODULE_NAME: &str = "trace_table_function";

/// Per-instance state of one table function.
pub struct TableFunctionState {
    pub prototype: Prototype,
    pub return_cols: Vec<ArgumentDefinition>,
    pub body: SqlSource,
    /// Entry `i` is the prototype argument bound at parameter slot `i + 1`.
    pub(crate) binding_order: Vec<usize>,
    /// The reusable prepared body statement, checked out while a cursor runs.
    pub(crate) statement: Option<PreparedStatement>,
}

impl TableFunctionState {
    pub(crate) fn new(
        prototype: Prototype,
        return_cols: Vec<ArgumentDefinition>,
        body: SqlSource,
        binding_order: Vec<usize>,
        statement: PreparedStatement,
    ) -> Self {
        Self {
            prototype,
            return_cols,
            body,
            binding_order,
            statement: Some(statement),
        }
    }
}

/// Lowercase-keyed registry of live table-function instances.
#[derive(Default)]
pub struct TableFunctionRegistry {
    states: RefCell<HashMap<String, Rc<RefCell<TableFunctionState>>>>,
}

impl TableFunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.borrow().contains_key(&name.to_lowercase())
    }

    pub fn register(&self, name: &str, state: TableFunctionState) {
        self.states
            .borrow_mut()
            .insert(name.to_lowercase(), Rc::new(RefCell::new(state)));
    }

    /// Fetch the state backing a live relation. A miss means the registry
    /// and the relation lifecycle are desynchronized.
    pub fn state(&self, name: &str) -> Rc<RefCell<TableFunctionState>> {
        match self.states.borrow().get(&name.to_lowercase()) {
            Some(state) => Rc::clone(state),
            None => panic!(
                "table function '{name}' has no registered state; \
                 registry and relation lifecycle are desynchronized"
            ),
        }
    }

    /// Remove exactly one entry when the relation is destroyed. A miss is
    /// the same invariant violation as in `state`.
    pub fn unregister(&self, name: &str) {
        if self.states.borrow_mut().remove(&name.to_lowercase()).is_none() {
            panic!(
                "table function '{name}' destroyed without registered state; \
                 registry and relation lifecycle are desynchronized"
            );
        }
    }
}

/// Shared hooks the virtual-table module needs. Weak references only: the
/// connection must not keep the registry (and through it, statements against
/// itself) alive.
pub(crate) struct TableFunctionModuleAux {
    pub registry: Weak<TableFunctionRegistry>,
    pub sqlite: Weak<SqliteEngine>,
}

pub(crate) fn register_module(
    sqlite: &SqliteEngine,
    aux: TableFunctionModuleAux,
) -> rusqlite::Result<()> {
    sqlite
        .connection()
        .create_module(MODULE_NAME, read_only_module::<TableFunctionTab>(), Some(aux))
}

fn module_err(msg: String) -> rusqlite::Error {
    rusqlite::Error::ModuleError(msg)
}

#[repr(C)]
pub(crate) struct TableFunctionTab {
    /// Base class. Must be first.
    base: ffi::sqlite3_vtab,
    name: String,
    state: Rc<RefCell<TableFunctionState>>,
    registry: Rc<TableFunctionRegistry>,
    sqlite: Rc<SqliteEngine>,
    /// Plans produced by `best_index`, keyed by the idx_num handed to
    /// `filter`: the prototype argument index carried by each argv slot.
    plans: Rc<RefCell<HashMap<i32, Vec<usize>>>>,
    next_plan: Cell<i32>,
}

impl TableFunctionTab {
    fn return_count(&self) -> usize {
        self.state.borrow().return_cols.len()
    }
}

unsafe impl<'vtab> VTab<'vtab> for TableFunctionTab {
    type Aux = TableFunctionModuleAux;
    type Cursor = TableFunctionCursor;

    fn connect(
        _db: &mut VTabConnection,
        aux: Option<&Self::Aux>,
        args: &[&[u8]],
    ) -> rusqlite::Result<(String, Self)> {
        let aux = aux.ok_or_else(|| module_err("missing module hooks".into()))?;
        let registry = aux
            .registry
            .upgrade()
            .ok_or_else(|| module_err("engine is shut down".into()))?;
        let sqlite = aux
            .sqlite
            .upgrade()
            .ok_or_else(|| module_err("engine is shut down".into()))?;

        let name_arg = args
            .get(3)
            .ok_or_else(|| module_err("a function name argument is required".into()))?;
        let name = String::from_utf8_lossy(name_arg)
            .trim()
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        let state = registry.state(&name);

        let schema = {
            let st = state.borrow();
            let mut cols: Vec<String> = st
                .return_cols
                .iter()
                .map(|c| format!("{} {}", c.name, c.ty.sqlite_type()))
                .collect();
            cols.extend(
                st.prototype
                    .args
                    .iter()
                    .map(|a| format!("{} {} HIDDEN", a.name, a.ty.sqlite_type())),
            );
            format!("CREATE TABLE x({})", cols.join(", "))
        };

        Ok((
            schema,
            TableFunctionTab {
                base: ffi::sqlite3_vtab::default(),
                name,
                state,
                registry,
                sqlite,
                plans: Rc::new(RefCell::new(HashMap::new())),
                next_plan: Cell::new(0),
            },
        ))
    }

    fn best_index(&self, info: &mut IndexInfo) -> rusqlite::Result<()> {
        let n_ret = self.return_count();
        let mut claimed = Vec::new();
        for (i, constraint) in info.constraints().enumerate() {
            if !constraint.is_usable() {
                continue;
            }
            let col = constraint.column() as usize;
            if col < n_ret {
                continue;
            }
            if constraint.operator() != IndexConstraintOp::SQLITE_INDEX_CONSTRAINT_EQ {
                continue;
            }
            claimed.push((i, col - n_ret));
        }

        let mut argv_args = Vec::with_capacity(claimed.len());
        for (slot, (i, arg)) in claimed.into_iter().enumerate() {
            let mut usage = info.constraint_usage(i);
            usage.set_argv_index(slot as i32 + 1);
            usage.set_omit(true);
            argv_args.push(arg);
        }

        // Identical plans share an idx_num, so repeated prepares of similar
        // queries do not grow the map.
        let mut plans = self.plans.borrow_mut();
        let existing = plans
            .iter()
            .find(|(_, p)| **p == argv_args)
            .map(|(&id, _)| id);
        let plan_id = existing.unwrap_or_else(|| {
            let id = self.next_plan.get() + 1;
            self.next_plan.set(id);
            plans.insert(id, argv_args);
            id
        });
        info.set_idx_num(plan_id);
        info.set_estimated_cost(1000.0);
        Ok(())
    }

    fn open(&'vtab mut self) -> rusqlite::Result<TableFunctionCursor> {
        Ok(TableFunctionCursor {
            base: ffi::sqlite3_vtab_cursor::default(),
            name: self.name.clone(),
            state: Rc::clone(&self.state),
            sqlite: Rc::clone(&self.sqlite),
            plans: Rc::clone(&self.plans),
            n_ret: self.return_count(),
            args: Vec::new(),
            rows: Vec::new(),
            pos: 0,
        })
    }
}

impl<'vtab> CreateVTab<'vtab> for TableFunctionTab {
    const KIND: VTabKind = VTabKind::Default;

    fn destroy(&self) -> rusqlite::Result<()> {
        self.registry.unregister(&self.name);
        Ok(())
    }
}

#[repr(C)]
pub(crate) struct TableFunctionCursor {
    /// Base class. Must be first.
    base: ffi::sqlite3_vtab_cursor,
    name: String,
    state: Rc<RefCell<TableFunctionState>>,
    sqlite: Rc<SqliteEngine>,
    plans: Rc<RefCell<HashMap<i32, Vec<usize>>>>,
    n_ret: usize,
    args: Vec<SqlValue>,
    rows: Vec<Vec<SqlValue>>,
    pos: usize,
}

impl TableFunctionCursor {
    /// Bind the call's arguments and materialize the body's rows.
    fn run(&mut self, bound: Vec<SqlValue>) -> rusqlite::Result<()> {
        let binding_order = self.state.borrow().binding_order.clone();

        // Check the reusable statement out of the state; prepare a fresh one
        // if another cursor holds it.
        let checked_out = self.state.borrow_mut().statement.take();
        let mut stmt = match checked_out {
            Some(stmt) => stmt,
            None => {
                let body = self.state.borrow().body.clone();
                self.sqlite
                    .prepare(body.sql())
                    .map_err(|f| module_err(f.message))?
            }
        };

        let result: rusqlite::Result<()> = (|| {
            for (slot, &arg_idx) in binding_order.iter().enumerate() {
                stmt.bind_value(slot + 1, &bound[arg_idx])
                    .map_err(|e| module_err(e.to_string()))?;
            }
            self.rows.clear();
            while stmt.step().map_err(|e| module_err(e.to_string()))? {
                self.rows
                    .push((0..self.n_ret).map(|i| stmt.column_value(i)).collect());
            }
            Ok(())
        })();
        let _ = stmt.reset();
        self.state.borrow_mut().statement = Some(stmt);
        result?;

        self.args = bound;
        self.pos = 0;
        Ok(())
    }
}

unsafe impl VTabCursor for TableFunctionCursor {
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
        let values: Vec<SqlValue> = args.iter().map(sql_value_from_ref).collect();

        let arg_count = self.state.borrow().prototype.args.len();
        let mut bound: Vec<Option<SqlValue>> = vec![None; arg_count];
        for (value, arg_idx) in values.into_iter().zip(plan) {
            bound[arg_idx] = Some(value);
        }
        let bound: Vec<SqlValue> = bound
            .into_iter()
            .collect::<Option<_>>()
            .ok_or_else(|| {
                module_err(format!(
                    "all arguments of table function '{}' must be constrained with '='",
                    self.name
                ))
            })?;

        self.run(bound)
    }

    fn next(&mut self) -> rusqlite::Result<()> {
        self.pos += 1;
        Ok(())
    }

    fn eof(&self) -> bool {
        self.pos >= self.rows.len()
    }

    fn column(&self, ctx: &mut Context, i: std::ffi::c_int) -> rusqlite::Result<()> {
        let i = i as usize;
        let value = if i < self.n_ret {
            &self.rows[self.pos][i]
        } else {
            &self.args[i - self.n_ret]
        };
        ctx.set_result(&to_rusqlite_value(value))
    }

    fn rowid(&self) -> rusqlite::Result<i64> {
        Ok(self.pos as i64)
    }
}
