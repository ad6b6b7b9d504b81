//! An owned prepared statement.
//!
//! Unlike a borrowed row cursor, this type can be stepped once, parked, and
//! drained later while other statements are prepared against the same
//! connection. That is exactly the shape the statement pipeline needs:
//! "prepare, step once, keep the handle around" is its core loop.

use std::ffi::{c_char, c_int, CStr};
use std::rc::Rc;

use rusqlite::ffi;
use tracesql_core::{Error, Result, SqlValue};

use crate::engine::SqliteEngine;
use crate::ffi_util;

pub struct PreparedStatement {
    // Keeps the connection open for as long as this statement exists.
    engine: Rc<SqliteEngine>,
    stmt: *mut ffi::sqlite3_stmt,
    done: bool,
}

impl PreparedStatement {
    pub(crate) fn new(engine: Rc<SqliteEngine>, stmt: *mut ffi::sqlite3_stmt) -> Self {
        Self {
            engine,
            stmt,
            done: false,
        }
    }

    /// Advance to the next row. `Ok(true)` means a row is available;
    /// `Ok(false)` means the statement is exhausted. Stepping an exhausted
    /// statement stays exhausted; SQLite itself would auto-reset and run the
    /// whole statement again.
    pub fn step(&mut self) -> Result<bool> {
        if self.done {
            return Ok(false);
        }
        match unsafe { ffi::sqlite3_step(self.stmt) } {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => {
                self.done = true;
                Ok(false)
            }
            _ => Err(Error::Engine(unsafe {
                ffi_util::errmsg(self.engine.raw_handle())
            })),
        }
    }

    /// Step until exhausted.
    pub fn drain(&mut self) -> Result<()> {
        while self.step()? {}
        Ok(())
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn column_count(&self) -> usize {
        unsafe { ffi::sqlite3_column_count(self.stmt) as usize }
    }

    pub fn column_name(&self, idx: usize) -> String {
        let ptr = unsafe { ffi::sqlite3_column_name(self.stmt, idx as c_int) };
        if ptr.is_null() {
            String::new()
        } else {
            unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
        }
    }

    /// The cell value at `idx` of the current row.
    pub fn column_value(&self, idx: usize) -> SqlValue {
        unsafe {
            let value = ffi::sqlite3_column_value(self.stmt, idx as c_int);
            ffi_util::value_from_raw(value)
        }
    }

    /// Whether column `idx` of the current row carries the reserved "no
    /// value" pointer sentinel.
    pub fn column_is_void(&self, idx: usize) -> bool {
        unsafe {
            let value = ffi::sqlite3_column_value(self.stmt, idx as c_int);
            ffi_util::value_is_void(value)
        }
    }

    /// Number of bound parameter slots.
    pub fn parameter_count(&self) -> usize {
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) as usize }
    }

    /// Name of the 1-based parameter slot, sigil included. `None` for
    /// positional (nameless) parameters.
    pub fn parameter_name(&self, idx: usize) -> Option<String> {
        let ptr = unsafe { ffi::sqlite3_bind_parameter_name(self.stmt, idx as c_int) };
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        }
    }

    /// Bind a value to the 1-based parameter slot.
    pub fn bind_value(&mut self, idx: usize, value: &SqlValue) -> Result<()> {
        let idx = idx as c_int;
        let rc = unsafe {
            match value {
                SqlValue::Null => ffi::sqlite3_bind_null(self.stmt, idx),
                SqlValue::Integer(i) => ffi::sqlite3_bind_int64(self.stmt, idx, *i),
                SqlValue::Float(f) => ffi::sqlite3_bind_double(self.stmt, idx, *f),
                SqlValue::Text(s) => ffi::sqlite3_bind_text(
                    self.stmt,
                    idx,
                    s.as_ptr() as *const c_char,
                    s.len() as c_int,
                    ffi::SQLITE_TRANSIENT(),
                ),
                SqlValue::Blob(b) => ffi::sqlite3_bind_blob(
                    self.stmt,
                    idx,
                    b.as_ptr() as *const std::ffi::c_void,
                    b.len() as c_int,
                    ffi::SQLITE_TRANSIENT(),
                ),
            }
        };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::Engine(unsafe {
                ffi_util::errmsg(self.engine.raw_handle())
            }))
        }
    }

    /// Rewind so the statement can run again with fresh bindings.
    pub fn reset(&mut self) -> Result<()> {
        self.done = false;
        let rc = unsafe { ffi::sqlite3_reset(self.stmt) };
        unsafe { ffi::sqlite3_clear_bindings(self.stmt) };
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(Error::Engine(unsafe {
                ffi_util::errmsg(self.engine.raw_handle())
            }))
        }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        unsafe { ffi::sqlite3_finalize(self.stmt) };
    }
}
