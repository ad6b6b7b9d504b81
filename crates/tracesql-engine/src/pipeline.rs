//! The statement pipeline.
//!
//! Statements run strictly in order. Before the next statement is prepared,
//! the previous one is stepped to exhaustion so its side effects (a table it
//! created, a row it inserted) are visible; each newly prepared statement is
//! then stepped exactly once so that statements nobody reads from still take
//! effect. Dialect statements are handled by the registries and replaced
//! with an inert placeholder before reaching SQLite.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;
use tracesql_core::{EngineConfig, Error, Result, SqlSource, SqlValue};
use tracesql_sqlite::{PreparedStatement, SqliteEngine};

use crate::functions::{self, FunctionRegistry};
use crate::modules::{self, ModuleRegistry};
use crate::parser::{ParsedStatement, Preprocessor, ReturnSpec, Statement};
use crate::prototype::{parse_prototype, validate_body_parameters, ArgumentDefinition, ScalarType};
use crate::table_functions::{
    self, TableFunctionModuleAux, TableFunctionRegistry, TableFunctionState, MODULE_NAME,
};

/// Stands in for dialect statements; prepares fine, returns nothing.
const INERT_STATEMENT: &str = "SELECT 0 WHERE 0";

/// A statement whose single output column carries this name is counted as
/// output-free.
pub const SUPPRESS_OUTPUT_COLUMN: &str = "suppress_query_output";

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionStats {
    pub statement_count: usize,
    pub statement_count_with_output: usize,
    /// Column count of the final statement.
    pub column_count: usize,
}

/// The final statement of a block, ready to be iterated, plus the stats
/// accumulated while executing everything before it.
pub struct ExecutionResult {
    statement: PreparedStatement,
    source: SqlSource,
    first_row_pending: bool,
    pub stats: ExecutionStats,
}

impl ExecutionResult {
    pub fn column_names(&self) -> Vec<String> {
        (0..self.statement.column_count())
            .map(|i| self.statement.column_name(i))
            .collect()
    }

    /// The next row of the final statement. The row the pipeline already
    /// stepped to is returned first.
    pub fn next_row(&mut self) -> Result<Option<Vec<SqlValue>>> {
        let on_row = if self.first_row_pending {
            self.first_row_pending = false;
            !self.statement.is_done()
        } else {
            self.statement
                .step()
                .map_err(|e| e.with_traceback(self.source.as_traceback(0)))?
        };
        if !on_row {
            return Ok(None);
        }
        let row = (0..self.statement.column_count())
            .map(|i| self.statement.column_value(i))
            .collect();
        Ok(Some(row))
    }
}

/// The engine: one SQLite connection plus the registries that extend it.
/// Constructed once by the host and shared via `Rc`.
pub struct TraceSqlEngine {
    config: EngineConfig,
    sqlite: Rc<SqliteEngine>,
    functions: FunctionRegistry,
    table_functions: Rc<TableFunctionRegistry>,
    modules: Rc<RefCell<ModuleRegistry>>,
}

impl TraceSqlEngine {
    pub fn new(config: EngineConfig) -> Result<Rc<Self>> {
        let sqlite = SqliteEngine::open_in_memory()?;
        sqlite.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {}(name TEXT);",
            config.bookkeeping_table
        ))?;

        let engine = Rc::new(Self {
            config,
            functions: FunctionRegistry::new(Rc::clone(&sqlite)),
            table_functions: Rc::new(TableFunctionRegistry::new()),
            modules: Rc::new(RefCell::new(ModuleRegistry::new())),
            sqlite,
        });

        // The IMPORT intrinsic and the table-function module both call back
        // into the engine; they hold weak references so the connection never
        // keeps the engine alive.
        let weak = Rc::downgrade(&engine);
        functions::create_scalar_function(
            &engine.sqlite,
            "import",
            1,
            Box::new(move |args| {
                let engine = weak
                    .upgrade()
                    .ok_or_else(|| Error::Engine("engine is shut down".into()))?;
                modules::import_callback(&engine, args)
            }),
        )?;
        table_functions::register_module(
            &engine.sqlite,
            TableFunctionModuleAux {
                registry: Rc::downgrade(&engine.table_functions),
                sqlite: Rc::downgrade(&engine.sqlite),
            },
        )
        .map_err(|e| Error::Engine(e.to_string()))?;

        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn sqlite(&self) -> &Rc<SqliteEngine> {
        &self.sqlite
    }

    pub(crate) fn modules(&self) -> &Rc<RefCell<ModuleRegistry>> {
        &self.modules
    }

    /// Execute every statement but the last; return the last one prepared
    /// and stepped once, ready for the caller to iterate.
    pub fn execute_until_last_statement(&self, source: SqlSource) -> Result<ExecutionResult> {
        let mut stats = ExecutionStats::default();
        let mut pending: Option<(PreparedStatement, SqlSource, bool)> = None;

        for parsed in Preprocessor::new(source) {
            let ParsedStatement {
                statement,
                source: stmt_source,
            } = parsed?;

            // Dialect statements take effect here and are replaced with an
            // inert rewrite; passthrough statements run as written.
            let effective = match statement {
                Statement::CreateFunction {
                    replace,
                    prototype,
                    returns,
                    body,
                } => {
                    let rewrite = self
                        .execute_create_function(replace, &prototype, returns, body)
                        .map_err(|e| e.with_traceback(stmt_source.as_traceback(0)))?;
                    stmt_source.rewritten(rewrite)
                }
                Statement::CreateTable { name, body } => {
                    self.register_materialized_table(&name, body)
                        .map_err(|e| e.with_traceback(stmt_source.as_traceback(0)))?;
                    stmt_source.rewritten(INERT_STATEMENT)
                }
                Statement::Passthrough { sql } => sql,
            };

            // Fully drain the previous statement before preparing the next:
            // later statements may read state the previous one mutates.
            if let Some((mut prev, prev_source, _)) = pending.take() {
                prev.drain()
                    .map_err(|e| e.with_traceback(prev_source.as_traceback(0)))?;
            }

            if self.config.trace_statements {
                debug!(sql = effective.sql(), "executing statement");
            }
            let mut stmt = match self.sqlite.prepare(effective.sql()) {
                Ok(stmt) => stmt,
                Err(f) => {
                    let offset = f.offset.unwrap_or(0);
                    return Err(Error::from(f).with_traceback(effective.as_traceback(offset)));
                }
            };

            // Step exactly once so side effects happen even if nothing reads
            // the statement's rows.
            let on_row = stmt
                .step()
                .map_err(|e| e.with_traceback(effective.as_traceback(0)))?;

            stats.statement_count += 1;
            if produces_output(&stmt, on_row) {
                stats.statement_count_with_output += 1;
            }
            pending = Some((stmt, effective, on_row));
        }

        let (statement, source, first_row_pending) =
            pending.ok_or_else(|| Error::Syntax("no valid SQL to run".into()))?;
        stats.column_count = statement.column_count();
        Ok(ExecutionResult {
            statement,
            source,
            first_row_pending,
            stats,
        })
    }

    /// Execute a whole block, discarding rows.
    pub fn execute(&self, source: SqlSource) -> Result<ExecutionStats> {
        let mut result = self.execute_until_last_statement(source)?;
        while result.next_row()?.is_some() {}
        Ok(result.stats)
    }

    fn execute_create_function(
        &self,
        replace: bool,
        prototype_text: &str,
        returns: ReturnSpec,
        body: SqlSource,
    ) -> Result<String> {
        match returns {
            ReturnSpec::Scalar(ty) => {
                self.register_scalar_function(replace, prototype_text, ty, body)?;
                Ok(INERT_STATEMENT.to_string())
            }
            ReturnSpec::Table(cols) => {
                self.register_table_function(replace, prototype_text, cols, body)
            }
        }
    }

    /// Register (or replace) a scalar function. Two-phase: the name becomes
    /// callable before the body is prepared, which is what lets the body
    /// call itself.
    pub fn register_scalar_function(
        &self,
        replace: bool,
        prototype_text: &str,
        return_type: ScalarType,
        body: SqlSource,
    ) -> Result<()> {
        let prototype = parse_prototype(prototype_text)?;
        let handle = self.functions.reserve(&prototype.name, prototype.args.len())?;
        let stmt = self.prepare_body(&body)?;
        let binding_order = validate_body_parameters(&stmt, &prototype)?;
        self.functions.finalize(
            &handle,
            replace,
            prototype,
            return_type,
            body,
            stmt,
            binding_order,
        )
    }

    /// Register (or replace) a table function and return the synthetic
    /// create-relation statement for SQLite.
    fn register_table_function(
        &self,
        replace: bool,
        prototype_text: &str,
        return_cols: Vec<ArgumentDefinition>,
        body: SqlSource,
    ) -> Result<String> {
        let prototype = parse_prototype(prototype_text)?;
        let stmt = self.prepare_body(&body)?;
        let binding_order = validate_body_parameters(&stmt, &prototype)?;

        if stmt.column_count() != return_cols.len() {
            return Err(Error::Structural(format!(
                "{}: the function body returns {} columns but {} were declared",
                prototype.name,
                stmt.column_count(),
                return_cols.len()
            )));
        }
        for (i, declared) in return_cols.iter().enumerate() {
            let actual = stmt.column_name(i);
            if !actual.eq_ignore_ascii_case(&declared.name) {
                return Err(Error::Structural(format!(
                    "{}: output column {} is named '{}' but '{}' was declared",
                    prototype.name, i, actual, declared.name
                )));
            }
        }

        let name = prototype.name.clone();
        if self.table_functions.contains(&name) {
            if !replace {
                return Err(Error::AlreadyExists(format!(
                    "{name}: table function already exists"
                )));
            }
            // Drop the live relation first; its destruction path removes the
            // old state, then the new one goes in.
            self.sqlite
                .execute_batch(&format!("DROP TABLE \"{name}\""))?;
        }
        self.table_functions.register(
            &name,
            TableFunctionState::new(prototype, return_cols, body, binding_order, stmt),
        );
        Ok(format!(
            "CREATE VIRTUAL TABLE \"{name}\" USING {MODULE_NAME}(\"{name}\")"
        ))
    }

    /// Turn on result caching for a single-integer-argument function.
    pub fn enable_function_memoization(&self, name: &str) -> Result<()> {
        self.functions.enable_memoization(name)
    }

    fn prepare_body(&self, body: &SqlSource) -> Result<PreparedStatement> {
        self.sqlite.prepare(body.sql()).map_err(|f| {
            let offset = f.offset.unwrap_or(0);
            Error::from(f).with_traceback(body.as_traceback(offset))
        })
    }
}

/// A statement counts as producing output unless it was exhausted by its
/// first step, or its sole output column is the "no value" sentinel or the
/// reserved suppression name.
fn produces_output(stmt: &PreparedStatement, on_row: bool) -> bool {
    if !on_row {
        return false;
    }
    if stmt.column_count() == 1 {
        if stmt.column_is_void(0) {
            return false;
        }
        if stmt.column_name(0) == SUPPRESS_OUTPUT_COLUMN {
            return false;
        }
    }
    true
}
