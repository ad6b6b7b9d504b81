//! Raw value conversions between `SqlValue` and SQLite's C API, plus the
//! reserved VOID pointer sentinel.
//!
//! Functions that must return "no value" (to satisfy SQLite's calling
//! convention) set a tagged pointer result instead of NULL; the statement
//! pipeline recognizes the tag and treats the column as output-free. A plain
//! NULL would be indistinguishable from a real null value.

use std::ffi::{c_char, c_int, CStr};

use rusqlite::ffi;
use tracesql_core::SqlValue;

/// Pointer type tag for the "no value" sentinel. Must be the same static
/// string on the producing and consuming side; SQLite compares by address.
pub static VOID_TAG: &CStr = c"VOID";

// Any non-null pointer works as the sentinel payload; only the tag matters.
static VOID_PAYLOAD: u8 = 0;

/// Read a protected `sqlite3_value` into an owned `SqlValue`.
///
/// # Safety
/// `value` must be a valid protected value pointer (an argument of a
/// function callback, or obtained from `sqlite3_column_value` on a statement
/// currently on a row).
pub unsafe fn value_from_raw(value: *mut ffi::sqlite3_value) -> SqlValue {
    match ffi::sqlite3_value_type(value) {
        ffi::SQLITE_INTEGER => SqlValue::Integer(ffi::sqlite3_value_int64(value)),
        ffi::SQLITE_FLOAT => SqlValue::Float(ffi::sqlite3_value_double(value)),
        ffi::SQLITE_TEXT => {
            // Call order matters: text() before bytes(), per the SQLite docs.
            let ptr = ffi::sqlite3_value_text(value);
            let len = ffi::sqlite3_value_bytes(value) as usize;
            if ptr.is_null() {
                SqlValue::Text(String::new())
            } else {
                let bytes = std::slice::from_raw_parts(ptr, len);
                SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
        ffi::SQLITE_BLOB => {
            let len = ffi::sqlite3_value_bytes(value) as usize;
            let ptr = ffi::sqlite3_value_blob(value);
            if ptr.is_null() || len == 0 {
                SqlValue::Blob(Vec::new())
            } else {
                SqlValue::Blob(std::slice::from_raw_parts(ptr as *const u8, len).to_vec())
            }
        }
        _ => SqlValue::Null,
    }
}

/// Whether `value` carries the VOID sentinel.
///
/// # Safety
/// `value` must be a valid protected value pointer.
pub unsafe fn value_is_void(value: *mut ffi::sqlite3_value) -> bool {
    !ffi::sqlite3_value_pointer(value, VOID_TAG.as_ptr()).is_null()
}

/// Set a function result from a `SqlValue`.
///
/// # Safety
/// `ctx` must be the context of a function callback currently executing.
pub unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &SqlValue) {
    match value {
        SqlValue::Null => ffi::sqlite3_result_null(ctx),
        SqlValue::Integer(i) => ffi::sqlite3_result_int64(ctx, *i),
        SqlValue::Float(f) => ffi::sqlite3_result_double(ctx, *f),
        SqlValue::Text(s) => ffi::sqlite3_result_text(
            ctx,
            s.as_ptr() as *const c_char,
            s.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        ),
        SqlValue::Blob(b) => ffi::sqlite3_result_blob(
            ctx,
            b.as_ptr() as *const std::ffi::c_void,
            b.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        ),
    }
}

/// Set the reserved "no value" sentinel as the function result.
///
/// # Safety
/// `ctx` must be the context of a function callback currently executing.
pub unsafe fn set_result_void(ctx: *mut ffi::sqlite3_context) {
    ffi::sqlite3_result_pointer(
        ctx,
        &VOID_PAYLOAD as *const u8 as *mut std::ffi::c_void,
        VOID_TAG.as_ptr(),
        None,
    );
}

/// Report an error from inside a function callback.
///
/// # Safety
/// `ctx` must be the context of a function callback currently executing.
pub unsafe fn set_result_error(ctx: *mut ffi::sqlite3_context, message: &str) {
    ffi::sqlite3_result_error(
        ctx,
        message.as_ptr() as *const c_char,
        message.len() as c_int,
    );
}

/// The connection's current error message.
///
/// # Safety
/// `db` must be a valid open database handle.
pub unsafe fn errmsg(db: *mut ffi::sqlite3) -> String {
    let ptr = ffi::sqlite3_errmsg(db);
    if ptr.is_null() {
        "unknown SQLite error".to_string()
    } else {
        CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}
