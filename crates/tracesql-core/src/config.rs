//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of the internal listing table that records every materialized
    /// table. Inserts into it are best-effort.
    pub bookkeeping_table: String,

    /// Emit a debug log line per executed statement.
    pub trace_statements: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bookkeeping_table: "trace_tables".to_string(),
            trace_statements: false,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TRACESQL_BOOKKEEPING_TABLE`: listing table name
    /// - `TRACESQL_TRACE_STATEMENTS`: per-statement debug logging (`1`/`true`)
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("TRACESQL_BOOKKEEPING_TABLE") {
            if !s.is_empty() {
                cfg.bookkeeping_table = s;
            }
        }

        if let Ok(s) = std::env::var("TRACESQL_TRACE_STATEMENTS") {
            cfg.trace_statements = s == "1" || s.eq_ignore_ascii_case("true");
        }

        cfg
    }
}
