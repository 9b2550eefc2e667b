//! Adapters towards the SQL front-end.

pub mod row_count;

pub use row_count::{to_wire_row_count, ROW_COUNT_ERROR, ROW_COUNT_UNKNOWN};
