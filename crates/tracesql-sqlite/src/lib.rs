//! tracesql-sqlite: the engine's view of SQLite.
//!
//! `SqliteEngine` owns the connection; `PreparedStatement` owns a raw
//! statement handle plus a strong reference to the engine, so statements can
//! be handed around, stepped incrementally, and pooled without borrowing the
//! connection. This is the only crate that touches SQLite's C API directly;
//! everything above works in terms of `SqlValue`.

pub mod engine;
pub mod ffi_util;
pub mod statement;

pub use engine::{PrepareFailure, SqliteEngine};
pub use statement::PreparedStatement;
