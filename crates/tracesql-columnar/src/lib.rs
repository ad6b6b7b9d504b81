#![forbid(unsafe_code)]
//! tracesql-columnar: column storage, overlays, and the filter engine.
//!
//! A column is a dense typed storage buffer plus an ordered stack of overlays
//! that remap logical row indices to storage indices or mark rows null.
//! Storage itself never holds nulls. The filter engine narrows a row set
//! constraint by constraint, picking between a bounds strategy (contiguous
//! narrowing over sorted, overlay-free storage) and an indexed strategy
//! (per-row evaluation through the overlay stack).

pub mod executor;
pub mod overlay;
pub mod row_set;
pub mod storage;
pub mod table;

pub use executor::{Column, Constraint, FilterOp, QueryExecutor};
pub use overlay::{NullOverlay, Overlay, OverlayStack, SelectorOverlay, MAX_OVERLAY_DEPTH};
pub use row_set::RowSet;
pub use storage::Storage;
pub use table::{RuntimeTable, RuntimeTableBuilder};
