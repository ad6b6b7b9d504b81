#![forbid(unsafe_code)]
//! tracesql-core: shared leaf types for the tracesql engine.
//!
//! This crate holds the pieces every other layer agrees on: the error enum,
//! the typed SQL value union, source spans with traceback rendering, and the
//! engine configuration. No SQLite, no IO, no statement logic lives here.

pub mod config;
pub mod error;
pub mod prelude;
pub mod source;
pub mod value;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use source::SqlSource;
pub use value::SqlValue;
