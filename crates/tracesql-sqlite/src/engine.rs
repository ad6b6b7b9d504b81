//! The owned SQLite connection.

use std::ffi::c_int;
use std::rc::Rc;

use rusqlite::{ffi, Connection};
use tracesql_core::{Error, Result};

use crate::ffi_util;
use crate::statement::PreparedStatement;

/// A prepare error plus the byte offset of the offending token, when SQLite
/// reports one. Callers use the offset to point a traceback at the exact
/// position in the user's input.
#[derive(Debug)]
pub struct PrepareFailure {
    pub message: String,
    pub offset: Option<usize>,
}

impl From<PrepareFailure> for Error {
    fn from(f: PrepareFailure) -> Self {
        Error::Engine(f.message)
    }
}

/// Wraps the single in-memory connection the engine runs against. Statements
/// hold an `Rc` to this, so the connection outlives every statement by
/// construction.
pub struct SqliteEngine {
    conn: Connection,
}

impl SqliteEngine {
    pub fn open_in_memory() -> Result<Rc<Self>> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Engine(format!("failed to open in-memory database: {e}")))?;
        Ok(Rc::new(Self { conn }))
    }

    /// The safe connection, for module registration and housekeeping SQL.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// The raw database handle. Dereferencing it is unsafe; holding it is
    /// only valid while `self` is alive.
    pub fn raw_handle(&self) -> *mut ffi::sqlite3 {
        unsafe { self.conn.handle() }
    }

    /// Run housekeeping SQL, mapping failures into the engine error domain.
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn
            .execute_batch(sql)
            .map_err(|e| Error::Engine(e.to_string()))
    }

    /// Prepare a single statement, reporting the error offset on failure.
    pub fn prepare(
        self: &Rc<Self>,
        sql: &str,
    ) -> std::result::Result<PreparedStatement, PrepareFailure> {
        let db = self.raw_handle();
        let mut stmt: *mut ffi::sqlite3_stmt = std::ptr::null_mut();
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                sql.as_ptr() as *const std::ffi::c_char,
                sql.len() as c_int,
                &mut stmt,
                std::ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            let message = unsafe { ffi_util::errmsg(db) };
            let offset = unsafe { ffi::sqlite3_error_offset(db) };
            // Statement may be partially allocated even on failure.
            if !stmt.is_null() {
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(PrepareFailure {
                message,
                offset: (offset >= 0).then_some(offset as usize),
            });
        }
        if stmt.is_null() {
            // Comment-only or empty input prepares to no statement at all.
            return Err(PrepareFailure {
                message: "statement has no SQL to prepare".to_string(),
                offset: None,
            });
        }
        Ok(PreparedStatement::new(Rc::clone(self), stmt))
    }
}
