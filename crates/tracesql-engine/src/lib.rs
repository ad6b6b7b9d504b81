//! tracesql-engine: the statement-execution layer.
//!
//! The preprocessor splits a block of dialect SQL into statements and
//! classifies the `CREATE TRACE ...` forms; the pipeline sequences their
//! execution against SQLite, handling dialect statements itself and
//! forwarding the rest. Registries keep user-defined scalar functions,
//! table functions, and materialized tables in lockstep with SQLite's
//! function and virtual-relation lifecycles.

pub mod functions;
pub mod modules;
pub mod parser;
pub mod pipeline;
pub mod prototype;
pub mod table_functions;
pub mod tables;

pub use parser::{ParsedStatement, Preprocessor, ReturnSpec, Statement};
pub use pipeline::{ExecutionResult, ExecutionStats, TraceSqlEngine};
pub use prototype::{ArgumentDefinition, Prototype, ScalarType};
pub use table_functions::{TableFunctionRegistry, TableFunctionState};
