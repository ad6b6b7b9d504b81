//! tracesql: embedded SQL execution layer for trace analytics.
//!
//! Umbrella crate re-exporting the workspace members so downstream users and
//! the root test suite can depend on a single crate.

pub use tracesql_columnar as columnar;
pub use tracesql_core as core;
pub use tracesql_engine as engine;
pub use tracesql_sqlite as sqlite;

pub use tracesql_core::prelude::*;
pub use tracesql_engine::TraceSqlEngine;
